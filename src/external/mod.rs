//! External collaborators
//!
//! - `ToolCommand`: bounded-time process runner
//! - `VolumeMounter`: the mount collaborator recovery waits on
//! - `VeraCryptMounter`: text-mode VeraCrypt implementation

mod errors;
mod mount;
mod tool;

pub use errors::{ToolError, ToolErrorCode, ToolResult};
pub use mount::{MountFailureKind, MountReport, MountRequest, VeraCryptMounter, VolumeMounter};
pub use tool::{ToolCommand, ToolOutput, ENUMERATION_TIMEOUT, MOUNT_TIMEOUT};
