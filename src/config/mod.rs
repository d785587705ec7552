//! Drive configuration
//!
//! `root/config.json` is an open document: a fixed set of known keys owned
//! here, plus any number of unknown keys preserved through every write.

mod document;
mod errors;
mod settings;

pub use document::ConfigDocument;
pub use errors::{ConfigError, ConfigErrorCode, ConfigResult};
pub use settings::{
    keys, KnownSettings, PostRecoverySettings, RecoverySettings, RecoveryState,
    CURRENT_SCHEMA_VERSION,
};
