//! Audit log errors

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditErrorCode {
    /// Log file or its directory could not be opened or created
    SdAuditOpen,
    /// Append or fsync failed; the entry may not be durable
    SdAuditWrite,
    /// Entry could not be encoded as JSON
    SdAuditEncode,
}

impl AuditErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditErrorCode::SdAuditOpen => "SD_AUDIT_OPEN",
            AuditErrorCode::SdAuditWrite => "SD_AUDIT_WRITE",
            AuditErrorCode::SdAuditEncode => "SD_AUDIT_ENCODE",
        }
    }
}

impl fmt::Display for AuditErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit log failure. Carries the log path when one is involved.
#[derive(Debug)]
pub struct AuditError {
    code: AuditErrorCode,
    path: Option<PathBuf>,
    detail: String,
    source: Option<io::Error>,
}

impl AuditError {
    pub fn open(path: &Path, source: io::Error) -> Self {
        Self {
            code: AuditErrorCode::SdAuditOpen,
            path: Some(path.to_path_buf()),
            detail: "cannot open audit log".into(),
            source: Some(source),
        }
    }

    pub fn write(path: &Path, what: &str, source: io::Error) -> Self {
        Self {
            code: AuditErrorCode::SdAuditWrite,
            path: Some(path.to_path_buf()),
            detail: format!("{} failed", what),
            source: Some(source),
        }
    }

    pub fn encode(err: serde_json::Error) -> Self {
        Self {
            code: AuditErrorCode::SdAuditEncode,
            path: None,
            detail: format!("cannot encode entry: {}", err),
            source: None,
        }
    }

    pub fn code(&self) -> AuditErrorCode {
        self.code
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.detail)?;
        if let Some(ref path) = self.path {
            write!(f, " ({})", path.display())?;
        }
        if let Some(ref source) = self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for AuditError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

pub type AuditResult<T> = Result<T, AuditError>;
