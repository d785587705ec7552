//! Disk and volume identity
//!
//! - `DiskIdentity`: a physical disk as seen by one enumeration; equality
//!   is the hardware id only
//! - `VolumeIdentity`: fingerprint of an encrypted volume header that binds
//!   a recovery container to exactly one volume

mod disk;
mod errors;
mod volume;

pub use disk::{identity_matches, BusType, DiskIdentity};
pub use errors::{IdentityError, IdentityErrorCode, IdentityResult};
pub use volume::{VolumeIdentity, VOLUME_IDENTITY_HEX_LEN, VOLUME_IDENTITY_REGION};
