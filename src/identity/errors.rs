//! Identity error types

use std::fmt;
use std::io;
use std::path::Path;

/// Identity error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityErrorCode {
    /// String is not a 32-character hex volume identity
    SdIdentityInvalid,
    /// Volume or header backup could not be read
    SdIdentityUnreadable,
    /// Volume or header backup is smaller than the identity region
    SdIdentityTooShort,
}

impl IdentityErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityErrorCode::SdIdentityInvalid => "SD_IDENTITY_INVALID",
            IdentityErrorCode::SdIdentityUnreadable => "SD_IDENTITY_UNREADABLE",
            IdentityErrorCode::SdIdentityTooShort => "SD_IDENTITY_TOO_SHORT",
        }
    }
}

impl fmt::Display for IdentityErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity error with context
#[derive(Debug)]
pub struct IdentityError {
    code: IdentityErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl IdentityError {
    fn new(code: IdentityErrorCode, message: impl Into<String>, source: Option<io::Error>) -> Self {
        Self {
            code,
            message: message.into(),
            source,
        }
    }

    /// Malformed identity string
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(IdentityErrorCode::SdIdentityInvalid, message, None)
    }

    /// Read failure on a volume or header backup
    pub fn unreadable(path: &Path, source: io::Error) -> Self {
        Self::new(
            IdentityErrorCode::SdIdentityUnreadable,
            format!("cannot read identity region of {}", path.display()),
            Some(source),
        )
    }

    /// Input shorter than the identity region
    pub fn too_short(actual: usize, required: usize) -> Self {
        Self::new(
            IdentityErrorCode::SdIdentityTooShort,
            format!("need {} bytes of volume header, got {}", required, actual),
            None,
        )
    }

    /// Returns the error code
    pub fn code(&self) -> IdentityErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for IdentityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for identity operations
pub type IdentityResult<T> = Result<T, IdentityError>;
