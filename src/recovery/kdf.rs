//! Argon2id key derivation
//!
//! Parameters travel with the container so that a kit generated today can
//! still be opened after the defaults change. Parameters read from a
//! container are bounded before use; a tampered header must not be able to
//! request gigabytes of memory.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::errors::{RecoveryError, RecoveryResult};
use super::mnemonic::RecoveryPhrase;

/// Algorithm id stored in the container header
pub const KDF_ALGORITHM_ARGON2ID: u8 = 1;

/// Salt length in bytes
pub const SALT_LEN: usize = 16;

/// Derived key length in bytes
pub const KEY_LEN: usize = 32;

const MAX_MEMORY_KIB: u32 = 1024 * 1024;
const MAX_ITERATIONS: u32 = 64;
const MAX_PARALLELISM: u32 = 16;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
}

impl KdfParams {
    pub const DEFAULT_MEMORY_KIB: u32 = 65_536;
    pub const DEFAULT_ITERATIONS: u32 = 3;
    pub const DEFAULT_PARALLELISM: u32 = 4;

    /// Validated parameters
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> RecoveryResult<Self> {
        if parallelism == 0 || parallelism > MAX_PARALLELISM {
            return Err(RecoveryError::KeyDerivation(format!(
                "parallelism {} outside 1..={}",
                parallelism, MAX_PARALLELISM
            )));
        }
        if iterations == 0 || iterations > MAX_ITERATIONS {
            return Err(RecoveryError::KeyDerivation(format!(
                "iterations {} outside 1..={}",
                iterations, MAX_ITERATIONS
            )));
        }
        if memory_kib < 8 * parallelism || memory_kib > MAX_MEMORY_KIB {
            return Err(RecoveryError::KeyDerivation(format!(
                "memory {} KiB outside {}..={}",
                memory_kib,
                8 * parallelism,
                MAX_MEMORY_KIB
            )));
        }
        Ok(Self {
            memory_kib,
            iterations,
            parallelism,
        })
    }

    pub fn memory_kib(&self) -> u32 {
        self.memory_kib
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: Self::DEFAULT_MEMORY_KIB,
            iterations: Self::DEFAULT_ITERATIONS,
            parallelism: Self::DEFAULT_PARALLELISM,
        }
    }
}

/// Derive the container key from a recovery phrase.
///
/// Runs to completion or fails; there is no partial result to reuse.
pub fn derive_key(
    phrase: &RecoveryPhrase,
    salt: &[u8],
    params: &KdfParams,
) -> RecoveryResult<Zeroizing<[u8; KEY_LEN]>> {
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| RecoveryError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(phrase.expose().as_bytes(), salt, key.as_mut())
        .map_err(|e| RecoveryError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams::new(64, 1, 1).unwrap()
    }

    #[test]
    fn test_default_params() {
        let params = KdfParams::default();
        assert_eq!(params.memory_kib(), 65_536);
        assert_eq!(params.iterations(), 3);
        assert_eq!(params.parallelism(), 4);
        assert_eq!(
            KdfParams::new(65_536, 3, 4).unwrap(),
            params
        );
    }

    #[test]
    fn test_params_bounds() {
        assert!(KdfParams::new(64, 0, 1).is_err());
        assert!(KdfParams::new(64, 1, 0).is_err());
        assert!(KdfParams::new(7, 1, 1).is_err());
        assert!(KdfParams::new(u32::MAX, 1, 1).is_err());
        assert!(KdfParams::new(64, 65, 1).is_err());
    }

    #[test]
    fn test_derivation_is_deterministic_per_salt() {
        let phrase = RecoveryPhrase::generate().unwrap();
        let salt_a = [1u8; SALT_LEN];
        let salt_b = [2u8; SALT_LEN];

        let k1 = derive_key(&phrase, &salt_a, &fast()).unwrap();
        let k2 = derive_key(&phrase, &salt_a, &fast()).unwrap();
        let k3 = derive_key(&phrase, &salt_b, &fast()).unwrap();

        assert_eq!(*k1, *k2);
        assert_ne!(*k1, *k3);
    }
}
