//! Typed view of the known configuration keys
//!
//! Deserialising ignores unknown keys; serialising emits only known keys.
//! The persisted document itself is never round-tripped through these
//! types, so unknown keys are carried by the deep merge instead.

use serde::{Deserialize, Serialize};

use crate::modes::SecurityMode;

/// Config key names
pub mod keys {
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const DRIVE_ID: &str = "drive_id";
    pub const MODE: &str = "mode";
    pub const VOLUME_PATH: &str = "volume_path";
    pub const MOUNT_TARGET: &str = "mount_target";
    pub const DISK_UNIQUE_ID: &str = "disk_unique_id";
    pub const RECOVERY: &str = "recovery";
    pub const POST_RECOVERY: &str = "post_recovery";
}

/// Schema version written by this release
pub const CURRENT_SCHEMA_VERSION: u64 = 3;

/// Lifecycle of the recovery kit on this drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryState {
    /// Kit generated and usable
    Enabled,
    /// Mount confirmed, container destruction in progress
    Consuming,
    /// Kit consumed; a new one must be generated
    Used,
}

impl RecoveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryState::Enabled => "enabled",
            RecoveryState::Consuming => "consuming",
            RecoveryState::Used => "used",
        }
    }
}

/// `recovery` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoverySettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RecoveryState>,
    /// Kit creation timestamp (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_identity: Option<String>,
    /// Written as `null` while unset so a new kit clears the previous one
    #[serde(default)]
    pub completed_at: Option<String>,
}

/// `post_recovery` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostRecoverySettings {
    /// Credentials were recovered and must be rotated
    #[serde(default)]
    pub rekey_required: bool,
    #[serde(default)]
    pub recovered_at: Option<String>,
}

/// Known keys of `config.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnownSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SecurityMode>,
    /// Payload volume (device or container file)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_path: Option<String>,
    /// Mount point or drive letter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_target: Option<String>,
    /// Hardware id of the drive recorded at setup, for drift detection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_unique_id: Option<String>,
    #[serde(default)]
    pub recovery: RecoverySettings,
    #[serde(default)]
    pub post_recovery: PostRecoverySettings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_keys_ignored_on_read() {
        let settings: KnownSettings = serde_json::from_value(json!({
            "mode": "keyfile",
            "lost_and_found": {"enabled": true},
            "recovery": {"enabled": true, "state": "consuming", "extra": 1}
        }))
        .unwrap();

        assert_eq!(settings.mode, Some(SecurityMode::PasswordKeyfile));
        assert!(settings.recovery.enabled);
        assert_eq!(settings.recovery.state, Some(RecoveryState::Consuming));
    }

    #[test]
    fn test_only_known_keys_serialised() {
        let settings = KnownSettings {
            mode: Some(SecurityMode::PasswordOnly),
            ..KnownSettings::default()
        };
        let value = serde_json::to_value(&settings).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object["mode"], "pw_only");
        assert!(!object.contains_key("volume_path"));
        assert!(object.contains_key("recovery"));
    }

    #[test]
    fn test_bad_mode_is_rejected() {
        let result: Result<KnownSettings, _> =
            serde_json::from_value(json!({"mode": "fingerprint"}));
        assert!(result.is_err());
    }
}
