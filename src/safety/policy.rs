//! Destructive-target guardrail
//!
//! A target disk is authorised only when it is positively known to be
//! neither the disk the program runs from nor a system disk. Every
//! ambiguity blocks.
//!
//! Check order:
//! 1. source disk resolvable and identifiable
//! 2. enumeration succeeded
//! 3. target present with a usable identity
//! 4. target is not the source (by `unique_id`, never by number)
//! 5. target is not a system or boot disk
//! 6. target is writable

use std::fmt;
use std::path::Path;

use serde::Serialize;

use super::enumerator::DiskEnumerator;
use crate::identity::{identity_matches, DiskIdentity};
use crate::observability::{log_event, Event};

/// Why a target was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    /// Not blocked
    None,
    /// Target is the disk hosting the running program
    SameAsSource,
    /// Target hosts the OS or its boot partition
    SystemDisk,
    /// No disk with the target number
    NotFound,
    /// The disk hosting the running program could not be determined
    SourceUnknown,
    /// Disk enumeration failed
    EnumerationFailed,
    /// Target reports no hardware identifier
    InvalidIdentity,
    /// Target is write-protected
    ReadOnly,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::None => "NONE",
            BlockReason::SameAsSource => "SAME_AS_SOURCE",
            BlockReason::SystemDisk => "SYSTEM_DISK",
            BlockReason::NotFound => "NOT_FOUND",
            BlockReason::SourceUnknown => "SOURCE_UNKNOWN",
            BlockReason::EnumerationFailed => "ENUMERATION_FAILED",
            BlockReason::InvalidIdentity => "INVALID_IDENTITY",
            BlockReason::ReadOnly => "READ_ONLY",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict on one proposed target
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    is_safe: bool,
    reason: BlockReason,
    source: Option<DiskIdentity>,
    target: Option<DiskIdentity>,
    message: String,
}

impl ValidationResult {
    fn allowed(source: DiskIdentity, target: DiskIdentity) -> Self {
        let message = format!("{} may be partitioned", target);
        Self {
            is_safe: true,
            reason: BlockReason::None,
            source: Some(source),
            target: Some(target),
            message,
        }
    }

    fn blocked(
        reason: BlockReason,
        source: Option<DiskIdentity>,
        target: Option<DiskIdentity>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            is_safe: false,
            reason,
            source,
            target,
            message: message.into(),
        }
    }

    pub fn is_safe(&self) -> bool {
        self.is_safe
    }

    pub fn reason(&self) -> BlockReason {
        self.reason
    }

    /// Disk hosting the running program, when resolved
    pub fn source(&self) -> Option<&DiskIdentity> {
        self.source.as_ref()
    }

    /// Target as observed during this validation
    pub fn target(&self) -> Option<&DiskIdentity> {
        self.target.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result of comparing the configured drive identity with a live disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IdentityDrift {
    /// Nothing configured to compare against
    NotRecorded,
    Matches,
    Drifted { expected: String, actual: String },
}

/// Compare a configured `disk_unique_id` with the live disk.
pub fn check_identity_drift(expected_unique_id: Option<&str>, live: &DiskIdentity) -> IdentityDrift {
    let expected = match expected_unique_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => return IdentityDrift::NotRecorded,
    };
    let recorded = DiskIdentity::new(expected, live.bus_type, live.disk_number);
    if identity_matches(&recorded, live) {
        return IdentityDrift::Matches;
    }

    let actual = live.unique_id.trim().to_string();
    log_event(
        Event::IdentityDrift,
        &[("actual", actual.as_str()), ("expected", expected)],
    );
    IdentityDrift::Drifted {
        expected: expected.to_string(),
        actual,
    }
}

/// Guardrail in front of every destructive disk operation
pub struct SafetyPolicy<E: DiskEnumerator> {
    enumerator: E,
}

impl<E: DiskEnumerator> SafetyPolicy<E> {
    pub fn new(enumerator: E) -> Self {
        Self { enumerator }
    }

    pub fn enumerator(&self) -> &E {
        &self.enumerator
    }

    /// Decide whether `target_disk_number` may be partitioned by a program
    /// running from `script_location`. Pure: nothing is modified.
    pub fn validate_before_partition(
        &self,
        script_location: &Path,
        target_disk_number: u32,
    ) -> ValidationResult {
        let result = self.evaluate(script_location, target_disk_number);

        let number = target_disk_number.to_string();
        let event = if result.is_safe {
            Event::SafetyAllowed
        } else {
            Event::SafetyBlocked
        };
        log_event(
            event,
            &[
                ("reason", result.reason.as_str()),
                ("target_disk_number", number.as_str()),
            ],
        );
        result
    }

    fn evaluate(&self, script_location: &Path, target_disk_number: u32) -> ValidationResult {
        let source = match self.enumerator.disk_hosting(script_location) {
            Ok(Some(source)) if source.has_identity() => source,
            Ok(Some(source)) => {
                return ValidationResult::blocked(
                    BlockReason::SourceUnknown,
                    Some(source),
                    None,
                    "the disk this program runs from reports no hardware id",
                )
            }
            Ok(None) => {
                return ValidationResult::blocked(
                    BlockReason::SourceUnknown,
                    None,
                    None,
                    format!("{} is not on a local disk", script_location.display()),
                )
            }
            Err(err) => {
                return ValidationResult::blocked(
                    BlockReason::EnumerationFailed,
                    None,
                    None,
                    err.to_string(),
                )
            }
        };

        let disks = match self.enumerator.list_disks() {
            Ok(disks) => disks,
            Err(err) => {
                return ValidationResult::blocked(
                    BlockReason::EnumerationFailed,
                    Some(source),
                    None,
                    err.to_string(),
                )
            }
        };

        let target = match disks
            .into_iter()
            .find(|d| d.identity.disk_number == target_disk_number)
        {
            Some(record) => record,
            None => {
                return ValidationResult::blocked(
                    BlockReason::NotFound,
                    Some(source),
                    None,
                    format!("no disk {}", target_disk_number),
                )
            }
        };

        if !target.identity.has_identity() {
            return ValidationResult::blocked(
                BlockReason::InvalidIdentity,
                Some(source),
                Some(target.identity),
                format!("disk {} reports no hardware id", target_disk_number),
            );
        }
        if identity_matches(&source, &target.identity) {
            return ValidationResult::blocked(
                BlockReason::SameAsSource,
                Some(source),
                Some(target.identity),
                "target is the drive this program is running from",
            );
        }
        if target.is_system || target.is_boot {
            return ValidationResult::blocked(
                BlockReason::SystemDisk,
                Some(source),
                Some(target.identity),
                "target hosts the operating system",
            );
        }
        if target.is_read_only {
            return ValidationResult::blocked(
                BlockReason::ReadOnly,
                Some(source),
                Some(target.identity),
                "target is write-protected",
            );
        }

        ValidationResult::allowed(source, target.identity)
    }
}
