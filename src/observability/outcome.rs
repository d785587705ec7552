//! Retry classification for recovery and safety operations

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of outcomes an operator-facing operation can end in.
///
/// The message and retry flag of each variant are fixed so that an
/// orchestrator can act on the outcome without parsing error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryOutcome {
    /// Operation completed
    Success,
    /// Resource temporarily unavailable; retry immediately
    TransientFailure,
    /// Input or data is wrong or corrupt; retrying the same input cannot succeed
    PermanentFailure,
    /// A required dependency or file is missing; retry after fixing it
    EnvironmentFailure,
    /// Operator cancelled
    UserAbort,
}

impl RecoveryOutcome {
    /// Returns the wire name of the outcome
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryOutcome::Success => "SUCCESS",
            RecoveryOutcome::TransientFailure => "TRANSIENT_FAILURE",
            RecoveryOutcome::PermanentFailure => "PERMANENT_FAILURE",
            RecoveryOutcome::EnvironmentFailure => "ENVIRONMENT_FAILURE",
            RecoveryOutcome::UserAbort => "USER_ABORT",
        }
    }

    /// Fixed operator-facing message
    pub fn message(&self) -> &'static str {
        match self {
            RecoveryOutcome::Success => "Recovery completed. Re-key the drive before storing new data.",
            RecoveryOutcome::TransientFailure => {
                "Temporary failure. Nothing was consumed; you can retry now."
            }
            RecoveryOutcome::PermanentFailure => {
                "The recovery phrase or recovery data is wrong. The kit is intact; retry only with a different phrase or a restored container."
            }
            RecoveryOutcome::EnvironmentFailure => {
                "A required component is missing. Fix the environment and retry."
            }
            RecoveryOutcome::UserAbort => "Cancelled by operator. Nothing was consumed.",
        }
    }

    /// Whether the same operation may be retried without changing its input
    pub fn is_retry_safe(&self) -> bool {
        match self {
            RecoveryOutcome::TransientFailure
            | RecoveryOutcome::EnvironmentFailure
            | RecoveryOutcome::UserAbort => true,
            RecoveryOutcome::Success | RecoveryOutcome::PermanentFailure => false,
        }
    }

    /// Process exit code reported by the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            RecoveryOutcome::Success => 0,
            RecoveryOutcome::PermanentFailure => 65,
            RecoveryOutcome::EnvironmentFailure => 69,
            RecoveryOutcome::TransientFailure => 75,
            RecoveryOutcome::UserAbort => 130,
        }
    }

    /// Returns true only for `Success`
    pub fn is_success(&self) -> bool {
        matches!(self, RecoveryOutcome::Success)
    }
}

impl fmt::Display for RecoveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
