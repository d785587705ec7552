//! Path resolver
//!
//! Single source of truth for every runtime file location. See
//! [`RuntimePaths`].

mod duplicates;
mod errors;
mod resolver;

pub use errors::{PathError, PathErrorCode, PathResult};
pub use resolver::{
    RuntimePaths, APP_DIR_NAME, AUDIT_LOG_NAME, CONFIG_FILE_NAME, ENVIRONMENT_SNAPSHOT_NAME,
    HEADER_BACKUP_NAME, KEYS_DIR_NAME, LOGS_DIR_NAME, RECOVERY_CONTAINER_NAME, RECOVERY_DIR_NAME,
    STATIC_DIR_NAME,
};
