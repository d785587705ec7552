//! Checksums and digests shared across the core
//!
//! - CRC32 (IEEE, via crc32fast) for corruption detection
//! - SHA-256 hex digests for identities and set fingerprints

use crc32fast::Hasher;
use sha2::{Digest, Sha256};

/// Computes a CRC32 checksum over the provided data.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// CRC32 as 8 lowercase hex characters.
pub fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32(data))
}

/// Full SHA-256 digest as 64 lowercase hex characters.
pub fn sha256_hex(data: &[u8]) -> String {
    to_hex(&Sha256::digest(data))
}

/// Lowercase hex encoding.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
