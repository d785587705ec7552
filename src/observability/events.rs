//! Observable events
//!
//! Every log line and audit entry names one of these events.

use std::fmt;

/// Observable events across the safety and recovery core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Safety policy
    /// Destructive target authorised
    SafetyAllowed,
    /// Destructive target refused
    SafetyBlocked,
    /// Configured disk identity differs from the live disk
    IdentityDrift,
    /// Path not backed by any enumerated local disk
    SourceUnresolved,

    // Layout
    /// A canonical resource exists in more than one place
    DuplicateResource,
    /// Write refused because it resolves outside the root
    WritePathRejected,

    // Configuration
    /// Configuration document loaded
    ConfigLoaded,
    /// Configuration document migrated to the current schema
    ConfigMigrated,
    /// Configuration document written
    ConfigWritten,

    // Recovery kit
    /// Recovery kit generated
    KitGenerated,
    /// Recovery kit generation failed
    KitGenerationFailed,
    /// Recovery phrase accepted and credentials decrypted
    RecoveryDecrypted,
    /// Recovery attempt failed before credentials were released
    RecoveryFailed,
    /// Container permanently deleted after a confirmed mount
    ContainerDestroyed,
    /// Container left in place after a failed or abandoned attempt
    ContainerPreserved,
    /// Interrupted destroy completed on the next run
    CommitResumed,
    /// Environment differs from the one captured at generation
    EnvironmentDrift,
    /// Paper chunks reassembled into a container
    ChunksReconstructed,
    /// Paper chunk set rejected
    ChunksRejected,

    // External tools
    /// External tool exceeded its deadline and was killed
    ToolTimeout,
    /// External tool exited unsuccessfully
    ToolFailed,
}

impl Event {
    /// Returns the event name string
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::SafetyAllowed => "SAFETY_ALLOWED",
            Event::SafetyBlocked => "SAFETY_BLOCKED",
            Event::IdentityDrift => "IDENTITY_DRIFT",
            Event::SourceUnresolved => "SOURCE_UNRESOLVED",
            Event::DuplicateResource => "DUPLICATE_RESOURCE",
            Event::WritePathRejected => "WRITE_PATH_REJECTED",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::ConfigMigrated => "CONFIG_MIGRATED",
            Event::ConfigWritten => "CONFIG_WRITTEN",
            Event::KitGenerated => "KIT_GENERATED",
            Event::KitGenerationFailed => "KIT_GENERATION_FAILED",
            Event::RecoveryDecrypted => "RECOVERY_DECRYPTED",
            Event::RecoveryFailed => "RECOVERY_FAILED",
            Event::ContainerDestroyed => "CONTAINER_DESTROYED",
            Event::ContainerPreserved => "CONTAINER_PRESERVED",
            Event::CommitResumed => "COMMIT_RESUMED",
            Event::EnvironmentDrift => "ENVIRONMENT_DRIFT",
            Event::ChunksReconstructed => "CHUNKS_RECONSTRUCTED",
            Event::ChunksRejected => "CHUNKS_REJECTED",
            Event::ToolTimeout => "TOOL_TIMEOUT",
            Event::ToolFailed => "TOOL_FAILED",
        }
    }

    /// Returns true for events that describe a refused or failed action
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::SafetyBlocked
                | Event::SourceUnresolved
                | Event::WritePathRejected
                | Event::KitGenerationFailed
                | Event::RecoveryFailed
                | Event::ChunksRejected
                | Event::ToolTimeout
                | Event::ToolFailed
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
