//! CLI-specific error types
//!
//! Subsystem errors keep their own `SD_*` code and retry classification.
//! Errors without a classification (bad arguments, unreadable config) exit
//! with the usage code.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::identity::IdentityError;
use crate::observability::{AuditError, RecoveryOutcome};
use crate::paths::PathError;
use crate::recovery::RecoveryError;
use crate::safety::SafetyError;

/// Exit code for usage and configuration errors
pub const USAGE_EXIT_CODE: i32 = 2;

/// CLI error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Invalid or missing argument
    Usage,
    /// Configuration unreadable or incomplete
    Config,
    /// stdin/stdout failure
    Io,
    /// Refusing to overwrite existing data
    AlreadyExists,
    /// Operator closed stdin instead of answering
    Aborted,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::Usage => "SD_CLI_USAGE",
            Self::Config => "SD_CLI_CONFIG",
            Self::Io => "SD_CLI_IO",
            Self::AlreadyExists => "SD_CLI_ALREADY_EXISTS",
            Self::Aborted => "SD_CLI_ABORTED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: &'static str,
    message: String,
    outcome: Option<RecoveryOutcome>,
}

impl CliError {
    fn new(code: &'static str, message: impl Into<String>, outcome: Option<RecoveryOutcome>) -> Self {
        Self {
            code,
            message: message.into(),
            outcome,
        }
    }

    /// Bad or missing argument
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::Usage.code(), msg, None)
    }

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::Config.code(), msg, None)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(
            CliErrorCode::Io.code(),
            msg,
            Some(RecoveryOutcome::TransientFailure),
        )
    }

    /// Target exists and `--force` was not given
    pub fn already_exists(what: impl fmt::Display) -> Self {
        Self::new(
            CliErrorCode::AlreadyExists.code(),
            format!("{} already exists; pass --force to replace it", what),
            None,
        )
    }

    /// stdin closed before the expected input
    pub fn aborted(what: &str) -> Self {
        Self::new(
            CliErrorCode::Aborted.code(),
            format!("no {} given", what),
            Some(RecoveryOutcome::UserAbort),
        )
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Retry classification, `None` for usage and configuration errors
    pub fn outcome(&self) -> Option<RecoveryOutcome> {
        self.outcome
    }

    /// Process exit code
    pub fn exit_code(&self) -> i32 {
        self.outcome.map_or(USAGE_EXIT_CODE, |o| o.exit_code())
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CliError {}

impl From<RecoveryError> for CliError {
    fn from(e: RecoveryError) -> Self {
        match e {
            RecoveryError::Config(inner) => inner.into(),
            other => Self::new(other.code(), other.to_string(), Some(other.outcome())),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::new(e.code().as_str(), e.message().to_string(), None)
    }
}

impl From<PathError> for CliError {
    fn from(e: PathError) -> Self {
        RecoveryError::from(e).into()
    }
}

impl From<IdentityError> for CliError {
    fn from(e: IdentityError) -> Self {
        RecoveryError::from(e).into()
    }
}

impl From<AuditError> for CliError {
    fn from(e: AuditError) -> Self {
        RecoveryError::from(e).into()
    }
}

impl From<SafetyError> for CliError {
    fn from(e: SafetyError) -> Self {
        Self::new(e.code().as_str(), e.to_string(), Some(e.outcome()))
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors_exit_two() {
        assert_eq!(CliError::usage("missing --volume").exit_code(), 2);
        assert_eq!(CliError::config_error("bad").exit_code(), 2);
        assert_eq!(CliError::already_exists("kit").exit_code(), 2);
    }

    #[test]
    fn test_recovery_errors_keep_code_and_outcome() {
        let err: CliError = RecoveryError::DecryptionFailed.into();
        assert_eq!(err.code_str(), "SD_RECOVERY_DECRYPT_FAILED");
        assert_eq!(err.outcome(), Some(RecoveryOutcome::PermanentFailure));
        assert_eq!(err.exit_code(), 65);
    }

    #[test]
    fn test_aborted_is_user_abort() {
        let err = CliError::aborted("recovery phrase");
        assert_eq!(err.exit_code(), 130);
        assert!(err.message().contains("recovery phrase"));
    }

    #[test]
    fn test_config_inside_recovery_error_is_usage() {
        let err: CliError = RecoveryError::Config(ConfigError::invalid("mode")).into();
        assert_eq!(err.exit_code(), 2);
    }
}
