//! Path resolver error types
//!
//! Path errors fail closed: the resolver never guesses a root and never
//! authorises a write it cannot prove is inside the root.

use std::fmt;
use std::io;
use std::path::Path;

/// Path error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathErrorCode {
    /// A relative path was supplied where an explicit root is required
    SdPathRelative,
    /// No application root could be located from the script location
    SdPathRootNotFound,
    /// A write resolves outside the application root
    SdPathOutsideRoot,
    /// A canonical resource exists in more than one place
    SdPathDuplicateResource,
    /// Filesystem error while resolving or scanning
    SdPathIo,
}

impl PathErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PathErrorCode::SdPathRelative => "SD_PATH_RELATIVE",
            PathErrorCode::SdPathRootNotFound => "SD_PATH_ROOT_NOT_FOUND",
            PathErrorCode::SdPathOutsideRoot => "SD_PATH_OUTSIDE_ROOT",
            PathErrorCode::SdPathDuplicateResource => "SD_PATH_DUPLICATE_RESOURCE",
            PathErrorCode::SdPathIo => "SD_PATH_IO",
        }
    }
}

impl fmt::Display for PathErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Path resolver error
#[derive(Debug)]
pub struct PathError {
    code: PathErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl PathError {
    fn new(code: PathErrorCode, message: impl Into<String>, source: Option<io::Error>) -> Self {
        Self {
            code,
            message: message.into(),
            source,
        }
    }

    pub fn relative(path: &Path) -> Self {
        Self::new(
            PathErrorCode::SdPathRelative,
            format!("an absolute path is required, got {}", path.display()),
            None,
        )
    }

    pub fn root_not_found(script: &Path) -> Self {
        Self::new(
            PathErrorCode::SdPathRootNotFound,
            format!("no application root found above {}", script.display()),
            None,
        )
    }

    /// Security violation: write target escapes the root
    pub fn outside_root(path: &Path, root: &Path) -> Self {
        Self::new(
            PathErrorCode::SdPathOutsideRoot,
            format!(
                "refusing to write {}: not inside {}",
                path.display(),
                root.display()
            ),
            None,
        )
    }

    pub fn duplicate(summary: impl Into<String>) -> Self {
        Self::new(PathErrorCode::SdPathDuplicateResource, summary, None)
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::new(PathErrorCode::SdPathIo, context, Some(source))
    }

    /// Returns the error code
    pub fn code(&self) -> PathErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// True when the error is a refused write rather than a lookup failure
    pub fn is_security_violation(&self) -> bool {
        self.code == PathErrorCode::SdPathOutsideRoot
    }
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for PathError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for path operations
pub type PathResult<T> = Result<T, PathError>;
