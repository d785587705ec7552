//! Persistence error types
//!
//! Every persistence failure is reported before any partial state becomes
//! visible at the final path.

use std::fmt;
use std::io;
use std::path::Path;

/// Persistence error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceErrorCode {
    /// Target has no usable parent directory
    SdPersistNoParent,
    /// Temporary file could not be created or written
    SdPersistTempWrite,
    /// Atomic rename onto the target failed
    SdPersistRename,
    /// Existing document could not be read
    SdPersistRead,
    /// Existing document is not valid JSON
    SdPersistParse,
    /// Document could not be serialized
    SdPersistSerialize,
}

impl PersistenceErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistenceErrorCode::SdPersistNoParent => "SD_PERSIST_NO_PARENT",
            PersistenceErrorCode::SdPersistTempWrite => "SD_PERSIST_TEMP_WRITE",
            PersistenceErrorCode::SdPersistRename => "SD_PERSIST_RENAME",
            PersistenceErrorCode::SdPersistRead => "SD_PERSIST_READ",
            PersistenceErrorCode::SdPersistParse => "SD_PERSIST_PARSE",
            PersistenceErrorCode::SdPersistSerialize => "SD_PERSIST_SERIALIZE",
        }
    }
}

impl fmt::Display for PersistenceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persistence error with full context
#[derive(Debug)]
pub struct PersistenceError {
    code: PersistenceErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl PersistenceError {
    fn new(code: PersistenceErrorCode, message: impl Into<String>, source: Option<io::Error>) -> Self {
        Self {
            code,
            message: message.into(),
            source,
        }
    }

    /// Target path has no parent directory
    pub fn no_parent(path: &Path) -> Self {
        Self::new(
            PersistenceErrorCode::SdPersistNoParent,
            format!("path has no parent directory: {}", path.display()),
            None,
        )
    }

    /// Temp file creation, write, or sync failed
    pub fn temp_write(path: &Path, source: io::Error) -> Self {
        Self::new(
            PersistenceErrorCode::SdPersistTempWrite,
            format!("failed to stage write for {}", path.display()),
            Some(source),
        )
    }

    /// Rename onto the final path failed
    pub fn rename(path: &Path, source: io::Error) -> Self {
        Self::new(
            PersistenceErrorCode::SdPersistRename,
            format!("failed to rename temp file onto {}", path.display()),
            Some(source),
        )
    }

    /// Existing document unreadable
    pub fn read(path: &Path, source: io::Error) -> Self {
        Self::new(
            PersistenceErrorCode::SdPersistRead,
            format!("failed to read {}", path.display()),
            Some(source),
        )
    }

    /// Existing document is not JSON
    pub fn parse(path: &Path, detail: impl fmt::Display) -> Self {
        Self::new(
            PersistenceErrorCode::SdPersistParse,
            format!("{} is not a valid JSON document: {}", path.display(), detail),
            None,
        )
    }

    /// Serialization failure
    pub fn serialize(detail: impl fmt::Display) -> Self {
        Self::new(
            PersistenceErrorCode::SdPersistSerialize,
            format!("failed to serialize document: {}", detail),
            None,
        )
    }

    /// Returns the error code
    pub fn code(&self) -> PersistenceErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;
