//! Safety policy
//!
//! Guards destructive disk operations. Disks are identified by hardware id,
//! never by OS disk number, and every uncertainty fails closed.

mod enumerator;
mod errors;
mod lsblk;
mod partition;
mod policy;

pub use enumerator::{DiskEnumerator, DiskRecord, PartitionInfo};
pub use errors::{SafetyError, SafetyErrorCode, SafetyResult};
pub use lsblk::LsblkEnumerator;
pub use partition::{resolve_drive_layout, DriveLayout, LauncherHint};
pub use policy::{check_identity_drift, BlockReason, IdentityDrift, SafetyPolicy, ValidationResult};
