//! Encrypted volume fingerprint
//!
//! The identity is the first 32 hex characters of SHA-256 over the first
//! 512 bytes of the volume. That region is the encrypted header: random
//! looking, unique per volume, and unchanged by mounting or writing data.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use super::errors::{IdentityError, IdentityResult};
use crate::digest::sha256_hex;

/// Bytes of the volume covered by the fingerprint
pub const VOLUME_IDENTITY_REGION: usize = 512;

/// Length of the identity string
pub const VOLUME_IDENTITY_HEX_LEN: usize = 32;

/// Fingerprint binding a recovery container to one volume.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VolumeIdentity(String);

impl VolumeIdentity {
    /// Parse a stored identity. Accepts either case, normalises to lowercase.
    pub fn parse(s: &str) -> IdentityResult<Self> {
        let trimmed = s.trim();
        if trimmed.len() != VOLUME_IDENTITY_HEX_LEN
            || !trimmed.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(IdentityError::invalid(format!(
                "volume identity must be {} hex characters, got {:?}",
                VOLUME_IDENTITY_HEX_LEN, trimmed
            )));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Fingerprint of an in-memory header (volume prefix or header backup).
    pub fn from_header_bytes(bytes: &[u8]) -> IdentityResult<Self> {
        if bytes.len() < VOLUME_IDENTITY_REGION {
            return Err(IdentityError::too_short(bytes.len(), VOLUME_IDENTITY_REGION));
        }
        let digest = sha256_hex(&bytes[..VOLUME_IDENTITY_REGION]);
        Ok(Self(digest[..VOLUME_IDENTITY_HEX_LEN].to_string()))
    }

    /// Fingerprint of a volume file or block device.
    pub fn from_volume(path: &Path) -> IdentityResult<Self> {
        let mut file = File::open(path).map_err(|e| IdentityError::unreadable(path, e))?;
        let mut region = vec![0u8; VOLUME_IDENTITY_REGION];
        let mut filled = 0;
        while filled < region.len() {
            match file.read(&mut region[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(IdentityError::unreadable(path, e)),
            }
        }
        Self::from_header_bytes(&region[..filled])
    }

    /// The identity as 32 lowercase hex characters
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time equality
    pub fn ct_eq(&self, other: &VolumeIdentity) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl TryFrom<String> for VolumeIdentity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VolumeIdentity> for String {
    fn from(identity: VolumeIdentity) -> Self {
        identity.0
    }
}

impl fmt::Display for VolumeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for VolumeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VolumeIdentity({})", self.0)
    }
}
