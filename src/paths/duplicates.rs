//! Single-source-of-truth enforcement
//!
//! Exactly one config file and exactly one static directory may exist on a
//! drive. Older layouts kept copies at the drive root, under `scripts/`, or
//! next to the launcher, so the whole scan base is walked.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use walkdir::WalkDir;

use super::errors::{PathError, PathResult};
use super::resolver::{RuntimePaths, CONFIG_FILE_NAME, STATIC_DIR_NAME};
use crate::observability::{log_event, Event};

/// Deep enough for `<drive>/.smartdrive/scripts/config.json` style leftovers.
const SCAN_DEPTH: usize = 4;

/// Directories never descended into.
const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    "$RECYCLE.BIN",
    "System Volume Information",
];

impl RuntimePaths {
    /// Map each layout resource found in more than one place to all of its
    /// locations. The canonical location, when present, is listed first.
    pub fn detect_duplicates(&self) -> PathResult<BTreeMap<String, Vec<PathBuf>>> {
        let base = self.scan_base().to_path_buf();
        let mut found: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        if !base.is_dir() {
            return Ok(found);
        }

        let mut walker = WalkDir::new(&base)
            .max_depth(SCAN_DEPTH)
            .follow_links(false)
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = entry.map_err(|e| {
                PathError::io(
                    format!("layout scan failed under {}", base.display()),
                    io::Error::from(e),
                )
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type();

            if file_type.is_dir() {
                if entry.depth() > 0 && SKIP_DIRS.contains(&name.as_str()) {
                    walker.skip_current_dir();
                } else if name == STATIC_DIR_NAME {
                    found
                        .entry(STATIC_DIR_NAME.to_string())
                        .or_default()
                        .push(entry.into_path());
                    walker.skip_current_dir();
                }
            } else if file_type.is_file() && name == CONFIG_FILE_NAME {
                found
                    .entry(CONFIG_FILE_NAME.to_string())
                    .or_default()
                    .push(entry.into_path());
            }
        }

        found.retain(|_, locations| locations.len() > 1);
        for (resource, locations) in found.iter_mut() {
            let canonical = if resource == CONFIG_FILE_NAME {
                self.config_file()
            } else {
                self.static_dir()
            };
            locations.sort();
            if let Some(pos) = locations.iter().position(|p| p == canonical) {
                let canonical = locations.remove(pos);
                locations.insert(0, canonical);
            }

            let count = locations.len().to_string();
            log_event(
                Event::DuplicateResource,
                &[("resource", resource.as_str()), ("copies", count.as_str())],
            );
        }

        Ok(found)
    }

    /// Fail when any layout resource is duplicated.
    pub fn check_no_duplicates(&self) -> PathResult<()> {
        let duplicates = self.detect_duplicates()?;
        if duplicates.is_empty() {
            return Ok(());
        }
        let summary = duplicates
            .iter()
            .map(|(resource, locations)| {
                let listed: Vec<String> =
                    locations.iter().map(|p| p.display().to_string()).collect();
                format!("{} found at {}", resource, listed.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");
        Err(PathError::duplicate(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::PathErrorCode;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_clean_layout_has_no_duplicates() {
        let drive = tempdir().unwrap();
        let paths = RuntimePaths::for_drive(drive.path()).unwrap();
        paths.ensure_layout().unwrap();
        fs::write(paths.config_file(), "{}").unwrap();

        assert!(paths.detect_duplicates().unwrap().is_empty());
        assert!(paths.check_no_duplicates().is_ok());
    }

    #[test]
    fn test_legacy_copies_reported_canonical_first() {
        let drive = tempdir().unwrap();
        let paths = RuntimePaths::for_drive(drive.path()).unwrap();
        paths.ensure_layout().unwrap();
        fs::write(paths.config_file(), "{}").unwrap();

        // Legacy copies at the drive root and under scripts/
        fs::write(drive.path().join(CONFIG_FILE_NAME), "{}").unwrap();
        fs::create_dir_all(paths.root().join("scripts")).unwrap();
        fs::write(paths.root().join("scripts").join(CONFIG_FILE_NAME), "{}").unwrap();
        fs::create_dir_all(drive.path().join(STATIC_DIR_NAME)).unwrap();

        let duplicates = paths.detect_duplicates().unwrap();

        let configs = &duplicates[CONFIG_FILE_NAME];
        assert_eq!(configs.len(), 3);
        assert_eq!(configs[0], paths.config_file());
        assert!(!configs[1..].iter().any(|p| p == paths.config_file()));

        let statics = &duplicates[STATIC_DIR_NAME];
        assert_eq!(statics.len(), 2);
        assert_eq!(statics[0], paths.static_dir());

        let err = paths.check_no_duplicates().unwrap_err();
        assert_eq!(err.code(), PathErrorCode::SdPathDuplicateResource);
    }

    #[test]
    fn test_files_inside_static_are_not_scanned() {
        let drive = tempdir().unwrap();
        let paths = RuntimePaths::for_drive(drive.path()).unwrap();
        paths.ensure_layout().unwrap();
        fs::write(paths.config_file(), "{}").unwrap();
        fs::create_dir_all(paths.static_dir().join("static")).unwrap();
        fs::write(paths.static_dir().join(CONFIG_FILE_NAME), "{}").unwrap();

        assert!(paths.detect_duplicates().unwrap().is_empty());
    }

    #[test]
    fn test_missing_base_reports_nothing() {
        let drive = tempdir().unwrap();
        let paths = RuntimePaths::for_target(&drive.path().join("absent")).unwrap();
        assert!(paths.detect_duplicates().unwrap().is_empty());
    }
}
