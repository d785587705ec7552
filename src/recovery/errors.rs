//! # Recovery Errors
//!
//! Every recovery error maps onto exactly one [`RecoveryOutcome`], which is
//! what the operator and the orchestrator act on.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::chunks::ChunkError;
use crate::config::ConfigError;
use crate::external::ToolError;
use crate::identity::{IdentityError, IdentityErrorCode};
use crate::observability::{AuditError, RecoveryOutcome};
use crate::paths::PathError;
use crate::persistence::PersistenceError;

/// Result type for recovery operations
pub type RecoveryResult<T> = Result<T, RecoveryError>;

/// Recovery kit errors
#[derive(Debug, Error)]
pub enum RecoveryError {
    // ==================
    // Wrong or corrupt input
    // ==================

    /// Phrase has the wrong word count, an unknown word, or a bad checksum
    #[error("recovery phrase rejected: {0}")]
    InvalidPhrase(String),

    /// Authenticated decryption failed
    #[error("decryption failed: wrong recovery phrase or tampered container")]
    DecryptionFailed,

    /// Container bytes do not parse
    #[error("recovery container is corrupt: {0}")]
    CorruptContainer(String),

    /// Container is bound to a different volume
    #[error("wrong kit for this drive: kit belongs to volume {expected}, drive is {actual}")]
    VolumeMismatch { expected: String, actual: String },

    /// The kit on this drive was already consumed
    #[error("recovery kit already used; generate a new kit after re-keying")]
    AlreadyUsed,

    /// Credentials do not have the shape the security mode needs
    #[error("credentials do not fit security mode {mode}: {reason}")]
    CredentialShape { mode: String, reason: String },

    /// Paper chunk set rejected
    #[error(transparent)]
    Chunks(#[from] ChunkError),

    // ==================
    // Environment
    // ==================

    /// No container at the expected location
    #[error("no recovery container at {0}")]
    ContainerMissing(PathBuf),

    /// KDF parameters unusable or KDF failed
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Cipher failure during sealing
    #[error("encryption failed")]
    Encryption,

    /// Configuration unreadable or invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    // ==================
    // Transient
    // ==================

    /// Filesystem failure
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    // ==================
    // Operator
    // ==================

    /// Operator cancelled
    #[error("cancelled by operator")]
    Aborted,
}

impl RecoveryError {
    /// Construct an I/O error with context
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        RecoveryError::Io {
            context: context.into(),
            source,
        }
    }

    /// Retry classification of this error
    pub fn outcome(&self) -> RecoveryOutcome {
        match self {
            RecoveryError::InvalidPhrase(_)
            | RecoveryError::DecryptionFailed
            | RecoveryError::CorruptContainer(_)
            | RecoveryError::VolumeMismatch { .. }
            | RecoveryError::AlreadyUsed
            | RecoveryError::CredentialShape { .. }
            | RecoveryError::Chunks(_) => RecoveryOutcome::PermanentFailure,

            RecoveryError::ContainerMissing(_)
            | RecoveryError::KeyDerivation(_)
            | RecoveryError::Encryption
            | RecoveryError::Config(_) => RecoveryOutcome::EnvironmentFailure,

            RecoveryError::Identity(err) => match err.code() {
                IdentityErrorCode::SdIdentityUnreadable => RecoveryOutcome::TransientFailure,
                IdentityErrorCode::SdIdentityInvalid | IdentityErrorCode::SdIdentityTooShort => {
                    RecoveryOutcome::PermanentFailure
                }
            },
            RecoveryError::Path(err) if err.is_security_violation() => {
                RecoveryOutcome::PermanentFailure
            }
            RecoveryError::Path(_) => RecoveryOutcome::EnvironmentFailure,
            RecoveryError::Tool(err) => err.outcome(),

            RecoveryError::Io { .. } | RecoveryError::Persistence(_) | RecoveryError::Audit(_) => {
                RecoveryOutcome::TransientFailure
            }

            RecoveryError::Aborted => RecoveryOutcome::UserAbort,
        }
    }

    /// Stable error code for audit details and CLI responses
    pub fn code(&self) -> &'static str {
        match self {
            RecoveryError::InvalidPhrase(_) => "SD_RECOVERY_INVALID_PHRASE",
            RecoveryError::DecryptionFailed => "SD_RECOVERY_DECRYPT_FAILED",
            RecoveryError::CorruptContainer(_) => "SD_RECOVERY_CORRUPT_CONTAINER",
            RecoveryError::VolumeMismatch { .. } => "SD_RECOVERY_VOLUME_MISMATCH",
            RecoveryError::AlreadyUsed => "SD_RECOVERY_ALREADY_USED",
            RecoveryError::CredentialShape { .. } => "SD_RECOVERY_CREDENTIAL_SHAPE",
            RecoveryError::Chunks(_) => "SD_RECOVERY_CHUNKS_REJECTED",
            RecoveryError::ContainerMissing(_) => "SD_RECOVERY_CONTAINER_MISSING",
            RecoveryError::KeyDerivation(_) => "SD_RECOVERY_KDF_FAILED",
            RecoveryError::Encryption => "SD_RECOVERY_ENCRYPT_FAILED",
            RecoveryError::Config(_) => "SD_RECOVERY_CONFIG",
            RecoveryError::Io { .. } => "SD_RECOVERY_IO",
            RecoveryError::Persistence(_) => "SD_RECOVERY_PERSIST",
            RecoveryError::Identity(_) => "SD_RECOVERY_IDENTITY",
            RecoveryError::Path(_) => "SD_RECOVERY_PATH",
            RecoveryError::Tool(_) => "SD_RECOVERY_TOOL",
            RecoveryError::Audit(_) => "SD_RECOVERY_AUDIT",
            RecoveryError::Aborted => "SD_RECOVERY_ABORTED",
        }
    }
}
