//! External tool error types

use std::fmt;
use std::io;
use std::time::Duration;

use crate::observability::RecoveryOutcome;

/// External tool error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorCode {
    /// Program is not installed or not on PATH
    SdToolNotFound,
    /// Program exceeded its deadline and was killed
    SdToolTimeout,
    /// Spawning or talking to the program failed
    SdToolIo,
    /// Program exited unsuccessfully or produced unusable output
    SdToolFailed,
}

impl ToolErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorCode::SdToolNotFound => "SD_TOOL_NOT_FOUND",
            ToolErrorCode::SdToolTimeout => "SD_TOOL_TIMEOUT",
            ToolErrorCode::SdToolIo => "SD_TOOL_IO",
            ToolErrorCode::SdToolFailed => "SD_TOOL_FAILED",
        }
    }
}

impl fmt::Display for ToolErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// External tool error with context
#[derive(Debug)]
pub struct ToolError {
    code: ToolErrorCode,
    program: String,
    message: String,
    source: Option<io::Error>,
}

impl ToolError {
    fn new(
        code: ToolErrorCode,
        program: &str,
        message: impl Into<String>,
        source: Option<io::Error>,
    ) -> Self {
        Self {
            code,
            program: program.to_string(),
            message: message.into(),
            source,
        }
    }

    pub fn not_found(program: &str) -> Self {
        Self::new(
            ToolErrorCode::SdToolNotFound,
            program,
            format!("{} is not installed or not on PATH", program),
            None,
        )
    }

    pub fn timeout(program: &str, limit: Duration) -> Self {
        Self::new(
            ToolErrorCode::SdToolTimeout,
            program,
            format!("{} did not finish within {}s", program, limit.as_secs()),
            None,
        )
    }

    pub fn io(program: &str, source: io::Error) -> Self {
        Self::new(
            ToolErrorCode::SdToolIo,
            program,
            format!("failed to run {}", program),
            Some(source),
        )
    }

    pub fn failed(program: &str, message: impl Into<String>) -> Self {
        Self::new(ToolErrorCode::SdToolFailed, program, message, None)
    }

    /// Returns the error code
    pub fn code(&self) -> ToolErrorCode {
        self.code
    }

    /// Program that failed
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Retry classification. Timeouts are transient but never retried here.
    pub fn outcome(&self) -> RecoveryOutcome {
        match self.code {
            ToolErrorCode::SdToolNotFound => RecoveryOutcome::EnvironmentFailure,
            ToolErrorCode::SdToolTimeout | ToolErrorCode::SdToolIo | ToolErrorCode::SdToolFailed => {
                RecoveryOutcome::TransientFailure
            }
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ToolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for external tool operations
pub type ToolResult<T> = Result<T, ToolError>;
