//! `config.json` read-modify-write
//!
//! Every write is an overlay of known keys deep-merged into whatever is on
//! disk at that moment, so keys owned by other tools (or newer releases)
//! survive untouched at any depth.
//!
//! Documents from older releases are migrated in memory on load. The
//! migrated keys ride along with the next write; loading alone never
//! touches the file.

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::errors::{ConfigError, ConfigResult};
use super::settings::{
    keys, KnownSettings, PostRecoverySettings, RecoverySettings, RecoveryState,
    CURRENT_SCHEMA_VERSION,
};
use crate::modes::SecurityMode;
use crate::observability::{log_event, Event};
use crate::paths::RuntimePaths;
use crate::persistence::{read_document, write_document_atomic};

/// The configuration document of one application root
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    path: PathBuf,
    document: Value,
    on_disk: bool,
    /// Migrated keys not yet written
    pending: Map<String, Value>,
}

impl ConfigDocument {
    /// Load `config.json`. A missing file loads as an empty document.
    pub fn load(paths: &RuntimePaths) -> ConfigResult<Self> {
        let path = paths.validate_write_path(paths.config_file())?;
        let (mut document, on_disk) = match read_document(&path)? {
            Some(value) => (value, true),
            None => (Value::Object(Map::new()), false),
        };
        if !document.is_object() {
            return Err(ConfigError::invalid(format!(
                "{} must contain a JSON object",
                path.display()
            )));
        }

        let shown = path.display().to_string();
        log_event(
            Event::ConfigLoaded,
            &[("path", shown.as_str()), ("present", if on_disk { "true" } else { "false" })],
        );

        let pending = if on_disk {
            migrate(&mut document)
        } else {
            Map::new()
        };

        Ok(Self {
            path,
            document,
            on_disk,
            pending,
        })
    }

    /// Resolved path of the document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The full document, unknown keys included
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Whether the file existed when loaded or has since been written
    pub fn is_on_disk(&self) -> bool {
        self.on_disk
    }

    /// Typed view of the known keys
    pub fn settings(&self) -> ConfigResult<KnownSettings> {
        serde_json::from_value(self.document.clone()).map_err(|e| {
            ConfigError::invalid(format!("{}: {}", self.path.display(), e))
        })
    }

    /// Whether loading migrated keys that have not been written yet
    pub fn has_pending_migration(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Deep-merge `overlay`, and any pending migration, into the on-disk
    /// document and write it atomically.
    pub fn apply(&mut self, overlay: Value) -> ConfigResult<()> {
        let Value::Object(fields) = overlay else {
            return Err(ConfigError::invalid("config overlay must be a JSON object"));
        };
        let mut merged = self.pending.clone();
        merged.extend(fields);
        self.document = write_document_atomic(&self.path, &Value::Object(merged))?;
        self.on_disk = true;
        self.pending.clear();

        let shown = self.path.display().to_string();
        log_event(Event::ConfigWritten, &[("path", shown.as_str())]);
        Ok(())
    }

    /// Persist the `recovery` section.
    pub fn record_recovery(&mut self, recovery: &RecoverySettings) -> ConfigResult<()> {
        let section = serde_json::to_value(recovery)?;
        self.apply(single_key(keys::RECOVERY, section))
    }

    /// Persist the `post_recovery` section.
    pub fn record_post_recovery(&mut self, post: &PostRecoverySettings) -> ConfigResult<()> {
        let section = serde_json::to_value(post)?;
        self.apply(single_key(keys::POST_RECOVERY, section))
    }

    /// First phase of consuming a kit: the container is about to go.
    pub fn mark_recovery_consuming(&mut self) -> ConfigResult<()> {
        let mut recovery = Map::new();
        recovery.insert("state".into(), json!(RecoveryState::Consuming.as_str()));
        self.apply(single_key(keys::RECOVERY, Value::Object(recovery)))
    }

    /// Second phase: the container is gone. Marks the kit used and flags
    /// the drive for re-keying in one write.
    pub fn mark_recovery_used(&mut self, completed_at: &str) -> ConfigResult<()> {
        let mut recovery = Map::new();
        recovery.insert("enabled".into(), json!(false));
        recovery.insert("state".into(), json!(RecoveryState::Used.as_str()));
        recovery.insert("completed_at".into(), json!(completed_at));

        let post = serde_json::to_value(PostRecoverySettings {
            rekey_required: true,
            recovered_at: Some(completed_at.to_string()),
        })?;

        let mut overlay = Map::new();
        overlay.insert(keys::RECOVERY.into(), Value::Object(recovery));
        overlay.insert(keys::POST_RECOVERY.into(), post);
        self.apply(Value::Object(overlay))
    }
}

/// Bring a document written by an older release up to the current schema:
/// assign a `drive_id`, set `schema_version` and rewrite legacy mode names.
/// Returns the keys that changed.
fn migrate(document: &mut Value) -> Map<String, Value> {
    let mut changed = Map::new();

    let has_drive_id = document
        .get(keys::DRIVE_ID)
        .and_then(Value::as_str)
        .map_or(false, |id| !id.trim().is_empty());
    if !has_drive_id {
        changed.insert(
            keys::DRIVE_ID.to_string(),
            Value::String(Uuid::new_v4().to_string()),
        );
    }

    let version = document
        .get(keys::SCHEMA_VERSION)
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if version < CURRENT_SCHEMA_VERSION {
        changed.insert(keys::SCHEMA_VERSION.to_string(), json!(CURRENT_SCHEMA_VERSION));
    }

    if let Some(raw) = document.get(keys::MODE).and_then(Value::as_str) {
        if let Some(mode) = SecurityMode::parse(raw) {
            if mode.as_str() != raw {
                changed.insert(keys::MODE.to_string(), Value::String(mode.as_str().into()));
            }
        }
    }

    if changed.is_empty() {
        return changed;
    }
    if let Some(fields) = document.as_object_mut() {
        fields.extend(changed.clone());
    }
    let from = version.to_string();
    let to = CURRENT_SCHEMA_VERSION.to_string();
    log_event(
        Event::ConfigMigrated,
        &[("from_version", from.as_str()), ("to_version", to.as_str())],
    );
    changed
}

fn single_key(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn layout() -> (tempfile::TempDir, RuntimePaths) {
        let dir = tempdir().unwrap();
        let paths = RuntimePaths::for_target(dir.path()).unwrap();
        (dir, paths)
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let (_dir, paths) = layout();
        let config = ConfigDocument::load(&paths).unwrap();
        assert!(!config.is_on_disk());
        assert_eq!(config.settings().unwrap(), KnownSettings::default());
    }

    #[test]
    fn test_known_key_write_preserves_unknown_keys() {
        let (_dir, paths) = layout();
        let original = r#"{
  "mode": "pw_only",
  "lost_and_found": {"enabled": true, "message": "Return to owner"},
  "recovery": {"enabled": false, "vendor": {"nested": [1, {"x": null}]}},
  "zzz_future_key": 42
}"#;
        fs::write(paths.config_file(), original).unwrap();
        let before: Value = serde_json::from_str(original).unwrap();

        let mut config = ConfigDocument::load(&paths).unwrap();
        config
            .record_recovery(&RecoverySettings {
                enabled: true,
                state: Some(RecoveryState::Enabled),
                ..RecoverySettings::default()
            })
            .unwrap();

        let reloaded = ConfigDocument::load(&paths).unwrap();
        let after = reloaded.document();
        assert_eq!(after["lost_and_found"], before["lost_and_found"]);
        assert_eq!(after["recovery"]["vendor"], before["recovery"]["vendor"]);
        assert_eq!(after["zzz_future_key"], before["zzz_future_key"]);
        assert_eq!(after["recovery"]["state"], "enabled");
        assert_eq!(reloaded.settings().unwrap().mode, Some(SecurityMode::PasswordOnly));
    }

    #[test]
    fn test_load_migrates_in_memory() {
        let (_dir, paths) = layout();
        let original = r#"{"mode": "yubikey", "custom": "x"}"#;
        fs::write(paths.config_file(), original).unwrap();

        let config = ConfigDocument::load(&paths).unwrap();
        assert!(config.has_pending_migration());
        let settings = config.settings().unwrap();
        assert!(Uuid::parse_str(settings.drive_id.as_deref().unwrap()).is_ok());
        assert_eq!(settings.schema_version, Some(CURRENT_SCHEMA_VERSION));
        assert_eq!(config.document()["mode"], "pw_gpg_keyfile");
        assert_eq!(config.document()["custom"], "x");

        assert_eq!(fs::read_to_string(paths.config_file()).unwrap(), original);
    }

    #[test]
    fn test_migration_persists_with_next_write() {
        let (_dir, paths) = layout();
        fs::write(paths.config_file(), r#"{"schema_version": 1}"#).unwrap();

        let mut config = ConfigDocument::load(&paths).unwrap();
        let drive_id = config.settings().unwrap().drive_id.unwrap();
        config.mark_recovery_consuming().unwrap();
        assert!(!config.has_pending_migration());

        let reloaded = ConfigDocument::load(&paths).unwrap();
        assert!(!reloaded.has_pending_migration());
        let settings = reloaded.settings().unwrap();
        assert_eq!(settings.drive_id, Some(drive_id));
        assert_eq!(settings.schema_version, Some(CURRENT_SCHEMA_VERSION));
        assert_eq!(settings.recovery.state, Some(RecoveryState::Consuming));
    }

    #[test]
    fn test_current_document_not_migrated() {
        let (_dir, paths) = layout();
        let drive_id = Uuid::new_v4().to_string();
        fs::write(
            paths.config_file(),
            json!({"drive_id": drive_id, "schema_version": CURRENT_SCHEMA_VERSION}).to_string(),
        )
        .unwrap();

        let config = ConfigDocument::load(&paths).unwrap();
        assert!(!config.has_pending_migration());
        assert_eq!(config.settings().unwrap().drive_id, Some(drive_id));
    }

    #[test]
    fn test_two_phase_consume() {
        let (_dir, paths) = layout();
        fs::write(
            paths.config_file(),
            r#"{"recovery": {"enabled": true, "state": "enabled", "created_at": "2026-01-01T00:00:00Z"}}"#,
        )
        .unwrap();

        let mut config = ConfigDocument::load(&paths).unwrap();
        config.mark_recovery_consuming().unwrap();
        let mid = ConfigDocument::load(&paths).unwrap().settings().unwrap();
        assert_eq!(mid.recovery.state, Some(RecoveryState::Consuming));
        assert!(mid.recovery.enabled);

        config.mark_recovery_used("2026-02-02T00:00:00Z").unwrap();
        let done = ConfigDocument::load(&paths).unwrap().settings().unwrap();
        assert_eq!(done.recovery.state, Some(RecoveryState::Used));
        assert!(!done.recovery.enabled);
        assert_eq!(done.recovery.created_at.as_deref(), Some("2026-01-01T00:00:00Z"));
        assert_eq!(done.recovery.completed_at.as_deref(), Some("2026-02-02T00:00:00Z"));
        assert!(done.post_recovery.rekey_required);
    }

    #[test]
    fn test_absent_file_not_migrated() {
        let (_dir, paths) = layout();
        let config = ConfigDocument::load(&paths).unwrap();
        assert!(!config.has_pending_migration());
        assert!(!paths.config_file().exists());
    }

    #[test]
    fn test_non_object_document_rejected() {
        let (_dir, paths) = layout();
        fs::write(paths.config_file(), "[1, 2]").unwrap();
        assert!(ConfigDocument::load(&paths).is_err());
    }
}
