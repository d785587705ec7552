//! Configuration error types

use std::fmt;

use crate::paths::PathError;
use crate::persistence::PersistenceError;

/// Configuration error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorCode {
    /// Document shape or a known key's value is invalid
    SdConfigInvalid,
    /// Reading or writing the document failed
    SdConfigPersist,
    /// Config file path is not inside the root
    SdConfigPath,
}

impl ConfigErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigErrorCode::SdConfigInvalid => "SD_CONFIG_INVALID",
            ConfigErrorCode::SdConfigPersist => "SD_CONFIG_PERSIST",
            ConfigErrorCode::SdConfigPath => "SD_CONFIG_PATH",
        }
    }
}

impl fmt::Display for ConfigErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration error
#[derive(Debug)]
pub struct ConfigError {
    code: ConfigErrorCode,
    message: String,
}

impl ConfigError {
    /// Invalid document or value
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: ConfigErrorCode::SdConfigInvalid,
            message: message.into(),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> ConfigErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<PersistenceError> for ConfigError {
    fn from(err: PersistenceError) -> Self {
        Self {
            code: ConfigErrorCode::SdConfigPersist,
            message: err.to_string(),
        }
    }
}

impl From<PathError> for ConfigError {
    fn from(err: PathError) -> Self {
        Self {
            code: ConfigErrorCode::SdConfigPath,
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid(err.to_string())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
