//! Canonical runtime layout
//!
//! Every path the core reads or writes is derived from one explicit root.
//! The process working directory is never consulted: callers either pass
//! the location of the running script (`from_script`) or the root of the
//! drive being set up (`for_target`, `for_drive`).

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use super::errors::{PathError, PathResult};
use crate::observability::{log_event, Event};

/// Name of the application directory on a managed drive
pub const APP_DIR_NAME: &str = ".smartdrive";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const STATIC_DIR_NAME: &str = "static";
pub const KEYS_DIR_NAME: &str = "keys";
pub const LOGS_DIR_NAME: &str = "logs";
pub const RECOVERY_DIR_NAME: &str = "recovery";
pub const RECOVERY_CONTAINER_NAME: &str = "recovery_container.bin";
pub const HEADER_BACKUP_NAME: &str = "header_backup.hdr";
pub const ENVIRONMENT_SNAPSHOT_NAME: &str = "environment.json";
pub const AUDIT_LOG_NAME: &str = "recovery.log";

/// Resolved file layout for one application root.
///
/// Every field is a descendant of `root`. Recomputed per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    root: PathBuf,
    config_file: PathBuf,
    static_dir: PathBuf,
    keys_dir: PathBuf,
    logs_dir: PathBuf,
    recovery_dir: PathBuf,
}

impl RuntimePaths {
    /// Locate the root from the running script or executable.
    ///
    /// Walks upward from `script_path` and takes the first ancestor that is
    /// itself named `.smartdrive` or that contains a `.smartdrive` directory.
    /// Fails closed when neither exists.
    pub fn from_script(script_path: &Path) -> PathResult<Self> {
        if !script_path.is_absolute() {
            return Err(PathError::relative(script_path));
        }
        let start = normalize(script_path);

        for ancestor in start.ancestors() {
            if ancestor.file_name() == Some(OsStr::new(APP_DIR_NAME)) {
                return Ok(Self::layout(ancestor));
            }
            let candidate = ancestor.join(APP_DIR_NAME);
            if candidate.is_dir() {
                return Ok(Self::layout(&candidate));
            }
        }

        Err(PathError::root_not_found(script_path))
    }

    /// Layout rooted exactly at `target_root`, independent of where the
    /// calling code lives. Nothing is created or checked on disk.
    pub fn for_target(target_root: &Path) -> PathResult<Self> {
        if !target_root.is_absolute() {
            return Err(PathError::relative(target_root));
        }
        Ok(Self::layout(&normalize(target_root)))
    }

    /// Layout for a drive mounted at `drive_root` (`<drive>/.smartdrive`).
    pub fn for_drive(drive_root: &Path) -> PathResult<Self> {
        Self::for_target(&drive_root.join(APP_DIR_NAME))
    }

    fn layout(root: &Path) -> Self {
        let recovery_dir = root.join(RECOVERY_DIR_NAME);
        Self {
            root: root.to_path_buf(),
            config_file: root.join(CONFIG_FILE_NAME),
            static_dir: root.join(STATIC_DIR_NAME),
            keys_dir: root.join(KEYS_DIR_NAME),
            logs_dir: root.join(LOGS_DIR_NAME),
            recovery_dir,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn static_dir(&self) -> &Path {
        &self.static_dir
    }

    pub fn keys_dir(&self) -> &Path {
        &self.keys_dir
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn recovery_dir(&self) -> &Path {
        &self.recovery_dir
    }

    /// `recovery/recovery_container.bin`
    pub fn container_file(&self) -> PathBuf {
        self.recovery_dir.join(RECOVERY_CONTAINER_NAME)
    }

    /// `recovery/header_backup.hdr`
    pub fn header_backup_file(&self) -> PathBuf {
        self.recovery_dir.join(HEADER_BACKUP_NAME)
    }

    /// `recovery/environment.json`
    pub fn environment_file(&self) -> PathBuf {
        self.recovery_dir.join(ENVIRONMENT_SNAPSHOT_NAME)
    }

    /// `logs/recovery.log`
    pub fn audit_log_file(&self) -> PathBuf {
        self.logs_dir.join(AUDIT_LOG_NAME)
    }

    /// Directory scanned for stray copies of layout resources.
    ///
    /// For a `.smartdrive` root this is the drive root above it, where
    /// legacy layouts kept their files.
    pub fn scan_base(&self) -> &Path {
        match (self.root.file_name(), self.root.parent()) {
            (Some(name), Some(parent)) if name == OsStr::new(APP_DIR_NAME) => parent,
            _ => &self.root,
        }
    }

    /// Authorise a write. Relative paths are taken relative to the root.
    ///
    /// Existing components are resolved through symlinks, so a link that
    /// points out of the root is rejected. Returns the resolved path.
    pub fn validate_write_path(&self, path: &Path) -> PathResult<PathBuf> {
        let candidate = if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.root.join(path))
        };

        let root = resolve_existing(&self.root)?;
        let resolved = resolve_existing(&candidate)?;

        if resolved != root && resolved.starts_with(&root) {
            Ok(resolved)
        } else {
            let shown = path.display().to_string();
            let root_shown = self.root.display().to_string();
            log_event(
                Event::WritePathRejected,
                &[("path", shown.as_str()), ("root", root_shown.as_str())],
            );
            Err(PathError::outside_root(path, &self.root))
        }
    }

    /// Create the layout directories under the root.
    pub fn ensure_layout(&self) -> PathResult<()> {
        for dir in [
            &self.static_dir,
            &self.keys_dir,
            &self.logs_dir,
            &self.recovery_dir,
        ] {
            let dir = self.validate_write_path(dir)?;
            fs::create_dir_all(&dir)
                .map_err(|e| PathError::io(format!("failed to create {}", dir.display()), e))?;
        }
        Ok(())
    }
}

/// Lexical normalisation: drops `.` and folds `..` into its parent.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalise the longest existing prefix and re-append the rest, so that
/// not-yet-created leaves still resolve.
fn resolve_existing(path: &Path) -> PathResult<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut rest: Vec<OsString> = Vec::new();

    loop {
        match fs::canonicalize(&existing) {
            Ok(mut resolved) => {
                for part in rest.iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                match (existing.file_name(), existing.parent()) {
                    (Some(name), Some(parent)) => {
                        rest.push(name.to_os_string());
                        existing = parent.to_path_buf();
                    }
                    _ => return Ok(path.to_path_buf()),
                }
            }
            Err(e) => {
                return Err(PathError::io(
                    format!("failed to resolve {}", existing.display()),
                    e,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::PathErrorCode;
    use tempfile::tempdir;

    #[test]
    fn test_for_target_fields_descend_from_root() {
        let dir = tempdir().unwrap();
        let paths = RuntimePaths::for_target(dir.path()).unwrap();

        for p in [
            paths.config_file().to_path_buf(),
            paths.static_dir().to_path_buf(),
            paths.keys_dir().to_path_buf(),
            paths.logs_dir().to_path_buf(),
            paths.container_file(),
            paths.audit_log_file(),
        ] {
            assert!(p.starts_with(dir.path()));
            assert_ne!(p, dir.path());
        }
    }

    #[test]
    fn test_for_target_rejects_relative_root() {
        let err = RuntimePaths::for_target(Path::new("drive/.smartdrive")).unwrap_err();
        assert_eq!(err.code(), PathErrorCode::SdPathRelative);
    }

    #[test]
    fn test_for_target_normalises_dots() {
        let paths = RuntimePaths::for_target(Path::new("/media/usb/./x/../.smartdrive")).unwrap();
        assert_eq!(paths.root(), Path::new("/media/usb/.smartdrive"));
        assert_eq!(paths.scan_base(), Path::new("/media/usb"));
    }

    #[test]
    fn test_from_script_inside_app_dir() {
        let dir = tempdir().unwrap();
        let app = dir.path().join(APP_DIR_NAME);
        let scripts = app.join("scripts");
        fs::create_dir_all(&scripts).unwrap();

        let paths = RuntimePaths::from_script(&scripts.join("smartdrive")).unwrap();
        assert_eq!(paths.root(), app.as_path());
    }

    #[test]
    fn test_from_script_at_drive_root() {
        let dir = tempdir().unwrap();
        let app = dir.path().join(APP_DIR_NAME);
        fs::create_dir_all(&app).unwrap();

        let paths = RuntimePaths::from_script(&dir.path().join("smartdrive.exe")).unwrap();
        assert_eq!(paths.root(), app.as_path());
    }

    #[test]
    fn test_from_script_rejects_relative() {
        let err = RuntimePaths::from_script(Path::new("scripts/smartdrive")).unwrap_err();
        assert_eq!(err.code(), PathErrorCode::SdPathRelative);
    }

    #[test]
    fn test_validate_write_path_inside_root() {
        let dir = tempdir().unwrap();
        let paths = RuntimePaths::for_target(dir.path()).unwrap();

        let ok = paths
            .validate_write_path(&paths.container_file())
            .unwrap();
        assert!(ok.ends_with("recovery/recovery_container.bin"));

        assert!(paths.validate_write_path(Path::new("keys/owner.key")).is_ok());
    }

    #[test]
    fn test_validate_write_path_rejects_escape() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        let paths = RuntimePaths::for_target(&root).unwrap();

        let outside = dir.path().join("elsewhere.json");
        let err = paths.validate_write_path(&outside).unwrap_err();
        assert!(err.is_security_violation());

        let climbing = paths
            .validate_write_path(Path::new("keys/../../elsewhere.json"))
            .unwrap_err();
        assert!(climbing.is_security_violation());

        assert!(paths.validate_write_path(&root).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_write_path_rejects_symlink_escape() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        let outside = dir.path().join("outside");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("keys")).unwrap();

        let paths = RuntimePaths::for_target(&root).unwrap();
        let err = paths
            .validate_write_path(&root.join("keys").join("owner.key"))
            .unwrap_err();
        assert!(err.is_security_violation());
    }

    #[test]
    fn test_ensure_layout_creates_directories() {
        let dir = tempdir().unwrap();
        let paths = RuntimePaths::for_drive(dir.path()).unwrap();
        paths.ensure_layout().unwrap();

        assert!(paths.keys_dir().is_dir());
        assert!(paths.logs_dir().is_dir());
        assert!(paths.recovery_dir().is_dir());
        assert!(paths.static_dir().is_dir());
    }
}
