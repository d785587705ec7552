//! 24-word recovery phrase
//!
//! 256 bits of OS entropy encoded as a BIP39 English mnemonic. The phrase
//! is shown to the operator once and never written anywhere by this crate.

use std::fmt;

use bip39::{Language, Mnemonic};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use super::errors::{RecoveryError, RecoveryResult};

/// Words in a recovery phrase
pub const RECOVERY_WORD_COUNT: usize = 24;

/// Entropy behind a 24-word phrase
pub const ENTROPY_BYTES: usize = 32;

/// A validated recovery phrase in normalised form (lowercase, single
/// spaces). Cleared from memory on drop; `Debug` never shows the words.
pub struct RecoveryPhrase(Zeroizing<String>);

impl RecoveryPhrase {
    /// Generate a fresh phrase from OS entropy.
    pub fn generate() -> RecoveryResult<Self> {
        let mut entropy = Zeroizing::new([0u8; ENTROPY_BYTES]);
        OsRng.fill_bytes(entropy.as_mut());

        let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy.as_ref())
            .map_err(|e| RecoveryError::InvalidPhrase(e.to_string()))?;
        Ok(Self(Zeroizing::new(mnemonic.to_string())))
    }

    /// Parse operator input. Case and whitespace are normalised; the word
    /// count and BIP39 checksum are verified before any key derivation.
    pub fn parse(input: &str) -> RecoveryResult<Self> {
        let normalized = Zeroizing::new(
            input
                .split_whitespace()
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
                .join(" "),
        );

        let count = normalized.split(' ').filter(|w| !w.is_empty()).count();
        if count != RECOVERY_WORD_COUNT {
            return Err(RecoveryError::InvalidPhrase(format!(
                "expected {} words, got {}",
                RECOVERY_WORD_COUNT, count
            )));
        }

        Mnemonic::parse_in_normalized(Language::English, &normalized)
            .map_err(|e| RecoveryError::InvalidPhrase(e.to_string()))?;

        Ok(Self(normalized))
    }

    /// The phrase text. Only for display to the operator and key derivation.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Words in order
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.0.split(' ')
    }
}

impl fmt::Debug for RecoveryPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoveryPhrase(<{} words redacted>)", RECOVERY_WORD_COUNT)
    }
}
