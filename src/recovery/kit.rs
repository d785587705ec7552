//! Stateless kit operations
//!
//! `generate` and `recover` touch no files; [`super::RecoveryVault`] wraps
//! them with persistence, audit and the one-time-use state machine.

use super::chunks::encode_chunks;
use super::container::RecoveryContainer;
use super::errors::RecoveryResult;
use super::kdf::KdfParams;
use super::mnemonic::RecoveryPhrase;
use super::payload::Credentials;
use crate::identity::VolumeIdentity;

/// A freshly generated kit. The phrase exists only in this value; it is
/// shown once and dropped.
pub struct GeneratedKit {
    phrase: RecoveryPhrase,
    container: RecoveryContainer,
}

impl GeneratedKit {
    /// The 24-word phrase for the operator to write down
    pub fn phrase(&self) -> &RecoveryPhrase {
        &self.phrase
    }

    pub fn container(&self) -> &RecoveryContainer {
        &self.container
    }

    /// Paper backup lines for the container
    pub fn chunks(&self) -> Vec<String> {
        encode_chunks(&self.container.to_bytes())
    }
}

/// Generate a kit with default KDF cost.
pub fn generate(
    credentials: &Credentials,
    volume_identity: &VolumeIdentity,
) -> RecoveryResult<GeneratedKit> {
    generate_with_params(credentials, volume_identity, KdfParams::default())
}

/// Generate a kit: fresh phrase, fresh salt and nonce, sealed credentials.
pub fn generate_with_params(
    credentials: &Credentials,
    volume_identity: &VolumeIdentity,
    kdf: KdfParams,
) -> RecoveryResult<GeneratedKit> {
    let phrase = RecoveryPhrase::generate()?;
    let container = RecoveryContainer::seal(&phrase, credentials, volume_identity, kdf)?;
    Ok(GeneratedKit { phrase, container })
}

/// Recover credentials from operator input. The phrase is validated before
/// any key derivation.
pub fn recover(
    phrase_input: &str,
    container: &RecoveryContainer,
    live_identity: &VolumeIdentity,
) -> RecoveryResult<Credentials> {
    let phrase = RecoveryPhrase::parse(phrase_input)?;
    container.open(&phrase, live_identity)
}
