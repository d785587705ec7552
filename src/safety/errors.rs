//! Safety error types

use std::fmt;

use crate::external::{ToolError, ToolErrorCode};
use crate::observability::RecoveryOutcome;

/// Safety error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyErrorCode {
    /// Enumeration tool is not installed
    SdSafetyToolMissing,
    /// Enumeration tool failed or timed out
    SdSafetyEnumerationFailed,
    /// Enumeration output could not be understood
    SdSafetyUnparseable,
}

impl SafetyErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyErrorCode::SdSafetyToolMissing => "SD_SAFETY_TOOL_MISSING",
            SafetyErrorCode::SdSafetyEnumerationFailed => "SD_SAFETY_ENUMERATION_FAILED",
            SafetyErrorCode::SdSafetyUnparseable => "SD_SAFETY_UNPARSEABLE",
        }
    }
}

impl fmt::Display for SafetyErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Disk enumeration error
#[derive(Debug)]
pub struct SafetyError {
    code: SafetyErrorCode,
    message: String,
    source: Option<ToolError>,
}

impl SafetyError {
    /// Enumeration output rejected
    pub fn unparseable(message: impl Into<String>) -> Self {
        Self {
            code: SafetyErrorCode::SdSafetyUnparseable,
            message: message.into(),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> SafetyErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Retry classification
    pub fn outcome(&self) -> RecoveryOutcome {
        match self.code {
            SafetyErrorCode::SdSafetyToolMissing | SafetyErrorCode::SdSafetyUnparseable => {
                RecoveryOutcome::EnvironmentFailure
            }
            SafetyErrorCode::SdSafetyEnumerationFailed => RecoveryOutcome::TransientFailure,
        }
    }
}

impl From<ToolError> for SafetyError {
    fn from(err: ToolError) -> Self {
        let code = match err.code() {
            ToolErrorCode::SdToolNotFound => SafetyErrorCode::SdSafetyToolMissing,
            _ => SafetyErrorCode::SdSafetyEnumerationFailed,
        };
        Self {
            code,
            message: format!("disk enumeration via {} failed", err.program()),
            source: Some(err),
        }
    }
}

impl fmt::Display for SafetyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for SafetyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for safety operations
pub type SafetyResult<T> = Result<T, SafetyError>;
