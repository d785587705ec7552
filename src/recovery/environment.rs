//! Environment snapshot
//!
//! Captured at kit generation and stored as `recovery/environment.json`
//! next to the container. A later recovery recaptures it and reports every
//! field that changed. Drift is informational: it is logged and audited,
//! never used to refuse a recovery.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{RecoveryError, RecoveryResult};
use crate::digest::sha256_hex;
use crate::external::ToolResult;
use crate::persistence::{read_document, write_bytes_atomic};

const MANIFEST: &str = include_str!("../../Cargo.toml");

const UNAVAILABLE: &str = "unavailable";

/// Source of facts about the external tooling.
pub trait EnvironmentSource {
    /// Version string of the volume-encryption tool
    fn external_tool_version(&self) -> ToolResult<String>;
}

/// Facts about the runtime that produced or consumes a recovery kit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    /// This program's name and version
    pub runtime_version: String,
    /// `family/os`, e.g. `unix/linux`
    pub os_family: String,
    pub external_tool_version: Option<String>,
    /// SHA-256 over the normalised dependency table this binary was built from
    pub dependency_set_hash: String,
    pub captured_at: String,
    /// Facts that could not be captured, by field
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capture_errors: BTreeMap<String, String>,
}

/// One field that differs between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentDrift {
    pub field: &'static str,
    pub recorded: String,
    pub current: String,
}

impl EnvironmentSnapshot {
    /// Capture the current environment. Lookup failures are recorded, not
    /// raised.
    pub fn capture(source: &dyn EnvironmentSource) -> Self {
        let mut capture_errors = BTreeMap::new();
        let external_tool_version = match source.external_tool_version() {
            Ok(version) => Some(version),
            Err(err) => {
                capture_errors.insert("external_tool_version".to_string(), err.to_string());
                None
            }
        };

        Self {
            runtime_version: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            os_family: format!("{}/{}", std::env::consts::FAMILY, std::env::consts::OS),
            external_tool_version,
            dependency_set_hash: dependency_set_hash(MANIFEST),
            captured_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            capture_errors,
        }
    }

    /// Fields of `self` (recorded) that differ in `current`.
    pub fn drift_from(&self, current: &EnvironmentSnapshot) -> Vec<EnvironmentDrift> {
        let tool = |v: &Option<String>| v.clone().unwrap_or_else(|| UNAVAILABLE.to_string());
        let pairs = [
            (
                "runtime_version",
                self.runtime_version.clone(),
                current.runtime_version.clone(),
            ),
            ("os_family", self.os_family.clone(), current.os_family.clone()),
            (
                "external_tool_version",
                tool(&self.external_tool_version),
                tool(&current.external_tool_version),
            ),
            (
                "dependency_set_hash",
                self.dependency_set_hash.clone(),
                current.dependency_set_hash.clone(),
            ),
        ];

        pairs
            .into_iter()
            .filter(|(_, recorded, current)| recorded != current)
            .map(|(field, recorded, current)| EnvironmentDrift {
                field,
                recorded,
                current,
            })
            .collect()
    }

    /// Load a stored snapshot. A missing file loads as `None`.
    pub fn load(path: &Path) -> RecoveryResult<Option<Self>> {
        match read_document(path)? {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                RecoveryError::CorruptContainer(format!("{}: {}", path.display(), e))
            }),
            None => Ok(None),
        }
    }

    /// Atomically replace the snapshot at `path`.
    pub fn store(&self, path: &Path) -> RecoveryResult<()> {
        let mut text = serde_json::to_string_pretty(self)
            .map_err(|e| RecoveryError::io("failed to serialize environment", e.into()))?;
        text.push('\n');
        write_bytes_atomic(path, text.as_bytes())?;
        Ok(())
    }
}

/// Hash of the `[dependencies]` table with comments, blank lines and
/// ordering normalised away.
fn dependency_set_hash(manifest: &str) -> String {
    let mut in_dependencies = false;
    let mut lines: Vec<&str> = Vec::new();
    for raw in manifest.lines() {
        let line = raw.trim();
        if line.starts_with('[') {
            in_dependencies = line == "[dependencies]";
            continue;
        }
        if in_dependencies && !line.is_empty() && !line.starts_with('#') {
            lines.push(line);
        }
    }
    lines.sort_unstable();
    sha256_hex(lines.join("\n").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::ToolError;

    struct FixedTool(Option<&'static str>);

    impl EnvironmentSource for FixedTool {
        fn external_tool_version(&self) -> ToolResult<String> {
            match self.0 {
                Some(v) => Ok(v.to_string()),
                None => Err(ToolError::not_found("veracrypt")),
            }
        }
    }

    #[test]
    fn test_capture_records_tool_failure() {
        let snapshot = EnvironmentSnapshot::capture(&FixedTool(None));
        assert!(snapshot.external_tool_version.is_none());
        assert!(snapshot.capture_errors.contains_key("external_tool_version"));
        assert!(snapshot.runtime_version.starts_with("smartdrive "));
    }

    #[test]
    fn test_no_drift_against_itself() {
        let snapshot = EnvironmentSnapshot::capture(&FixedTool(Some("1.26.7")));
        assert!(snapshot.drift_from(&snapshot.clone()).is_empty());
    }

    #[test]
    fn test_tool_upgrade_reported() {
        let recorded = EnvironmentSnapshot::capture(&FixedTool(Some("1.25.9")));
        let current = EnvironmentSnapshot::capture(&FixedTool(Some("1.26.7")));
        let drift = recorded.drift_from(&current);
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].field, "external_tool_version");
        assert_eq!(drift[0].recorded, "1.25.9");
        assert_eq!(drift[0].current, "1.26.7");
    }

    #[test]
    fn test_dependency_hash_ignores_order_and_comments() {
        let a = "[package]\nname = \"x\"\n[dependencies]\nserde = \"1\"\nsha2 = \"0.10\"\n[dev-dependencies]\ntempfile = \"3\"\n";
        let b = "[dependencies]\n# crypto\nsha2 = \"0.10\"\n\nserde = \"1\"\n";
        let c = "[dependencies]\nsha2 = \"0.11\"\nserde = \"1\"\n";
        assert_eq!(dependency_set_hash(a), dependency_set_hash(b));
        assert_ne!(dependency_set_hash(a), dependency_set_hash(c));
    }

    #[test]
    fn test_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("environment.json");
        assert!(EnvironmentSnapshot::load(&path).unwrap().is_none());

        let snapshot = EnvironmentSnapshot::capture(&FixedTool(Some("1.26.7")));
        snapshot.store(&path).unwrap();
        assert_eq!(EnvironmentSnapshot::load(&path).unwrap(), Some(snapshot));
    }
}
