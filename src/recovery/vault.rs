//! Recovery kit lifecycle on one drive
//!
//! Per attempt:
//!
//! ```text
//! CREATED --decrypt--> DECRYPTED --mount ok----> CONTAINER_DESTROYED
//!     |                    |
//!     +--> FAILED          +--mount failed--> CONTAINER_PRESERVED
//! ```
//!
//! The container is deleted only on a positive mount report, as a two-phase
//! commit recorded in `config.json`:
//!
//! 1. `recovery.state = "consuming"`
//! 2. container file removed
//! 3. `recovery.state = "used"`, `post_recovery.rekey_required = true`
//!
//! A run interrupted between 1 and 3 is completed forward by the next
//! attempt; it is never rolled back. Every attempt appends to the audit log
//! before its result is returned.

use std::fs;
use std::io;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use super::container::RecoveryContainer;
use super::environment::{EnvironmentDrift, EnvironmentSource, EnvironmentSnapshot};
use super::errors::{RecoveryError, RecoveryResult};
use super::kdf::KdfParams;
use super::kit::{generate_with_params, GeneratedKit};
use super::mnemonic::RecoveryPhrase;
use super::payload::Credentials;
use crate::config::{ConfigDocument, PostRecoverySettings, RecoverySettings, RecoveryState};
use crate::external::{MountFailureKind, MountReport};
use crate::identity::VolumeIdentity;
use crate::observability::{log_event, AuditLog, AuditLogEntry, Event, Logger, RecoveryOutcome};
use crate::paths::RuntimePaths;
use crate::persistence::write_bytes_atomic;

/// Recovery state of a drive, safe to print
#[derive(Debug, Clone, Serialize)]
pub struct KitStatus {
    pub enabled: bool,
    pub state: Option<RecoveryState>,
    pub container_present: bool,
    pub created_at: Option<String>,
    pub volume_identity: Option<String>,
    pub completed_at: Option<String>,
    pub rekey_required: bool,
    pub environment: Option<EnvironmentSnapshot>,
}

/// Kit operations bound to one application root.
pub struct RecoveryVault<'a> {
    paths: &'a RuntimePaths,
    audit: &'a dyn AuditLog,
    environment: &'a dyn EnvironmentSource,
    kdf: KdfParams,
}

impl<'a> RecoveryVault<'a> {
    pub fn new(
        paths: &'a RuntimePaths,
        audit: &'a dyn AuditLog,
        environment: &'a dyn EnvironmentSource,
    ) -> Self {
        Self {
            paths,
            audit,
            environment,
            kdf: KdfParams::default(),
        }
    }

    /// Override the KDF cost used for new kits.
    pub fn with_kdf_params(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn paths(&self) -> &RuntimePaths {
        self.paths
    }

    // ==================
    // Generation
    // ==================

    /// Generate and store a kit bound to `volume_identity`.
    ///
    /// Writes the container, the optional header backup and the environment
    /// snapshot, then records the kit in `config.json`. An existing kit is
    /// replaced.
    pub fn generate(
        &self,
        credentials: &Credentials,
        volume_identity: &VolumeIdentity,
        header_backup: Option<&[u8]>,
    ) -> RecoveryResult<GeneratedKit> {
        match self.generate_inner(credentials, volume_identity, header_backup) {
            Ok(kit) => {
                let entry = AuditLogEntry::new(Event::KitGenerated, RecoveryOutcome::Success)
                    .with_detail("volume_identity", volume_identity.as_str())
                    .with_detail("unlock_kind", credentials.kind())
                    .with_detail("kdf_memory_kib", self.kdf.memory_kib())
                    .with_detail("kdf_iterations", self.kdf.iterations())
                    .with_detail("header_backup", header_backup.is_some());
                self.audit.append(&entry)?;
                log_event(
                    Event::KitGenerated,
                    &[("volume_identity", volume_identity.as_str())],
                );
                Ok(kit)
            }
            Err(err) => {
                let entry = AuditLogEntry::new(Event::KitGenerationFailed, err.outcome())
                    .with_detail("code", err.code())
                    .with_detail("error", err.to_string());
                self.append_best_effort(&entry);
                let code = err.code();
                log_event(Event::KitGenerationFailed, &[("code", code)]);
                Err(err)
            }
        }
    }

    fn generate_inner(
        &self,
        credentials: &Credentials,
        volume_identity: &VolumeIdentity,
        header_backup: Option<&[u8]>,
    ) -> RecoveryResult<GeneratedKit> {
        let mut config = ConfigDocument::load(self.paths)?;
        if let Some(mode) = config.settings()?.mode {
            if !mode.accepts(credentials) {
                return Err(RecoveryError::CredentialShape {
                    mode: mode.as_str().to_string(),
                    reason: format!("got {} credentials", credentials.kind()),
                });
            }
        }

        if let Some(header) = header_backup {
            let from_header = VolumeIdentity::from_header_bytes(header)?;
            if !from_header.ct_eq(volume_identity) {
                return Err(RecoveryError::VolumeMismatch {
                    expected: volume_identity.to_string(),
                    actual: from_header.to_string(),
                });
            }
        }

        self.paths.ensure_layout()?;
        let kit = generate_with_params(credentials, volume_identity, self.kdf)?;

        let container_path = self.paths.validate_write_path(&self.paths.container_file())?;
        kit.container().write_to(&container_path)?;

        if let Some(header) = header_backup {
            let header_path = self
                .paths
                .validate_write_path(&self.paths.header_backup_file())?;
            write_bytes_atomic(&header_path, header)?;
        }

        let env_path = self.paths.validate_write_path(&self.paths.environment_file())?;
        EnvironmentSnapshot::capture(self.environment).store(&env_path)?;

        config.record_recovery(&RecoverySettings {
            enabled: true,
            state: Some(RecoveryState::Enabled),
            created_at: Some(now()),
            volume_identity: Some(volume_identity.to_string()),
            completed_at: None,
        })?;
        config.record_post_recovery(&PostRecoverySettings::default())?;
        Ok(kit)
    }

    // ==================
    // Recovery
    // ==================

    /// Validate the phrase and decrypt the stored container for the live
    /// volume. The container stays on disk; call
    /// [`DecryptedRecovery::confirm_mount`] with the mount result.
    pub fn begin_recovery(
        &self,
        phrase_input: &str,
        live_identity: &VolumeIdentity,
    ) -> RecoveryResult<DecryptedRecovery<'_>> {
        let mut drift = Vec::new();
        match self.decrypt(phrase_input, live_identity, &mut drift) {
            Ok(credentials) => {
                let entry = AuditLogEntry::new(Event::RecoveryDecrypted, RecoveryOutcome::Success)
                    .with_detail("volume_identity", live_identity.as_str())
                    .with_detail("unlock_kind", credentials.kind())
                    .with_detail("environment_drift", drift_detail(&drift));
                // No credentials leave this call without a durable audit entry.
                self.audit.append(&entry)?;
                log_event(
                    Event::RecoveryDecrypted,
                    &[("volume_identity", live_identity.as_str())],
                );
                Ok(DecryptedRecovery {
                    vault: self,
                    credentials,
                    volume_identity: live_identity.clone(),
                })
            }
            Err(err) => {
                let entry = AuditLogEntry::new(Event::RecoveryFailed, err.outcome())
                    .with_detail("volume_identity", live_identity.as_str())
                    .with_detail("code", err.code())
                    .with_detail("error", err.to_string())
                    .with_detail("environment_drift", drift_detail(&drift));
                let code = err.code();
                let outcome = err.outcome();
                log_event(
                    Event::RecoveryFailed,
                    &[("code", code), ("outcome", outcome.as_str())],
                );
                // An attempt that cannot be recorded fails as an audit error.
                self.audit.append(&entry)?;
                Err(err)
            }
        }
    }

    fn decrypt(
        &self,
        phrase_input: &str,
        live_identity: &VolumeIdentity,
        drift: &mut Vec<EnvironmentDrift>,
    ) -> RecoveryResult<Credentials> {
        let mut config = ConfigDocument::load(self.paths)?;
        match config.settings()?.recovery.state {
            Some(RecoveryState::Consuming) => {
                self.complete_consume(&mut config, Event::CommitResumed)?;
                return Err(RecoveryError::AlreadyUsed);
            }
            Some(RecoveryState::Used) => return Err(RecoveryError::AlreadyUsed),
            Some(RecoveryState::Enabled) | None => {}
        }

        let phrase = RecoveryPhrase::parse(phrase_input)?;

        let container_path = self.paths.validate_write_path(&self.paths.container_file())?;
        let container = RecoveryContainer::read_from(&container_path)?;

        *drift = self.environment_drift();
        container.open(&phrase, live_identity)
    }

    /// Compare the stored snapshot with the live environment. Unreadable
    /// snapshots are reported, never fatal.
    fn environment_drift(&self) -> Vec<EnvironmentDrift> {
        let recorded = match EnvironmentSnapshot::load(&self.paths.environment_file()) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Vec::new(),
            Err(err) => {
                let reason = err.to_string();
                Logger::warn(Event::EnvironmentDrift.as_str(), &[("error", reason.as_str())]);
                return Vec::new();
            }
        };
        let drift = recorded.drift_from(&EnvironmentSnapshot::capture(self.environment));
        for d in &drift {
            Logger::warn(
                Event::EnvironmentDrift.as_str(),
                &[
                    ("current", d.current.as_str()),
                    ("field", d.field),
                    ("recorded", d.recorded.as_str()),
                ],
            );
        }
        drift
    }

    /// Phases 1-3 of the destroy commit. Safe to re-run at any point.
    fn complete_consume(&self, config: &mut ConfigDocument, event: Event) -> RecoveryResult<String> {
        config.mark_recovery_consuming()?;

        let container_path = self.paths.validate_write_path(&self.paths.container_file())?;
        match fs::remove_file(&container_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(RecoveryError::io(
                    format!("failed to remove {}", container_path.display()),
                    e,
                ))
            }
        }

        let completed_at = now();
        config.mark_recovery_used(&completed_at)?;

        let entry = AuditLogEntry::new(event, RecoveryOutcome::Success)
            .with_detail("container", container_path.display().to_string())
            .with_detail("completed_at", completed_at.as_str());
        if let Err(err) = self.audit.append(&entry) {
            // The container is already gone; the destroy stands.
            let reason = err.to_string();
            Logger::error(event.as_str(), &[("audit_error", reason.as_str())]);
        }
        log_event(event, &[("completed_at", completed_at.as_str())]);
        Ok(completed_at)
    }

    /// Finish an interrupted destroy, if one is pending. Returns whether
    /// anything was done.
    pub fn resume_interrupted_commit(&self) -> RecoveryResult<bool> {
        let mut config = ConfigDocument::load(self.paths)?;
        if config.settings()?.recovery.state != Some(RecoveryState::Consuming) {
            return Ok(false);
        }
        self.complete_consume(&mut config, Event::CommitResumed)?;
        Ok(true)
    }

    // ==================
    // Status
    // ==================

    pub fn status(&self) -> RecoveryResult<KitStatus> {
        let settings = ConfigDocument::load(self.paths)?.settings()?;
        Ok(KitStatus {
            enabled: settings.recovery.enabled,
            state: settings.recovery.state,
            container_present: self.paths.container_file().is_file(),
            created_at: settings.recovery.created_at,
            volume_identity: settings.recovery.volume_identity,
            completed_at: settings.recovery.completed_at,
            rekey_required: settings.post_recovery.rekey_required,
            environment: EnvironmentSnapshot::load(&self.paths.environment_file())?,
        })
    }

    fn append_best_effort(&self, entry: &AuditLogEntry) {
        if let Err(err) = self.audit.append(entry) {
            let reason = err.to_string();
            Logger::error(entry.event.as_str(), &[("audit_error", reason.as_str())]);
        }
    }
}

/// Credentials decrypted and awaiting the mount verdict.
///
/// Dropping this value without a verdict leaves the container in place.
pub struct DecryptedRecovery<'v> {
    vault: &'v RecoveryVault<'v>,
    credentials: Credentials,
    volume_identity: VolumeIdentity,
}

impl<'v> DecryptedRecovery<'v> {
    /// Credentials to hand to the mount collaborator
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn volume_identity(&self) -> &VolumeIdentity {
        &self.volume_identity
    }

    /// Act on the mount verdict: destroy the container after a confirmed
    /// mount, preserve it otherwise.
    pub fn confirm_mount(self, report: MountReport) -> RecoveryResult<RecoveryOutcome> {
        match report {
            MountReport::Mounted => {
                let mut config = ConfigDocument::load(self.vault.paths)?;
                self.vault
                    .complete_consume(&mut config, Event::ContainerDestroyed)?;
                Ok(RecoveryOutcome::Success)
            }
            MountReport::Failed {
                kind,
                exit_code,
                message,
            } => {
                let outcome = match kind {
                    MountFailureKind::InvalidCredentials | MountFailureKind::HeaderDamaged => {
                        RecoveryOutcome::PermanentFailure
                    }
                    MountFailureKind::Busy | MountFailureKind::Other => {
                        RecoveryOutcome::TransientFailure
                    }
                };
                let exit_code = exit_code.map_or(Value::Null, Value::from);
                self.preserve(
                    outcome,
                    &[
                        ("mount_failure", Value::from(kind.as_str())),
                        ("exit_code", exit_code),
                        ("message", Value::from(message)),
                    ],
                )
            }
        }
    }

    /// Give up without a mount verdict. The container is preserved.
    pub fn abandon(self, outcome: RecoveryOutcome, reason: &str) -> RecoveryResult<RecoveryOutcome> {
        self.preserve(outcome, &[("reason", Value::from(reason))])
    }

    /// Operator cancelled after decryption.
    pub fn abort(self) -> RecoveryResult<RecoveryOutcome> {
        self.abandon(RecoveryOutcome::UserAbort, "cancelled by operator")
    }

    fn preserve(
        self,
        outcome: RecoveryOutcome,
        details: &[(&str, Value)],
    ) -> RecoveryResult<RecoveryOutcome> {
        let mut entry = AuditLogEntry::new(Event::ContainerPreserved, outcome)
            .with_detail("volume_identity", self.volume_identity.as_str());
        for (key, value) in details {
            entry = entry.with_detail(key, value.clone());
        }
        self.vault.audit.append(&entry)?;
        log_event(Event::ContainerPreserved, &[("outcome", outcome.as_str())]);
        Ok(outcome)
    }
}

fn drift_detail(drift: &[EnvironmentDrift]) -> Value {
    serde_json::to_value(drift).unwrap_or(Value::Null)
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
