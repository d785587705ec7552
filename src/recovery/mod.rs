//! Emergency recovery kit
//!
//! Lets the owner regain access to the payload volume after losing every
//! regular credential, without creating a backdoor for anyone else.
//!
//! - 24-word BIP39 phrase, shown once, never stored
//! - Argon2id key derivation from the phrase
//! - XChaCha20-Poly1305 container bound to one volume identity
//! - one-time use: destroyed only after a confirmed mount
//! - paper backup as checksummed text chunks
//!
//! # Invariants
//!
//! - A container never opens against a different volume's identity
//! - Any failure before a confirmed mount leaves the container in place
//! - Every attempt is audited before its result is returned

mod chunks;
mod container;
mod environment;
mod errors;
mod kdf;
mod kit;
mod mnemonic;
mod payload;
mod vault;

pub use chunks::{encode_chunks, reconstruct, reconstruct_file, ChunkError, CHUNK_DATA_BYTES};
pub use container::RecoveryContainer;
pub use environment::{EnvironmentDrift, EnvironmentSource, EnvironmentSnapshot};
pub use errors::{RecoveryError, RecoveryResult};
pub use kdf::{derive_key, KdfParams, KEY_LEN, SALT_LEN};
pub use kit::{generate, generate_with_params, recover, GeneratedKit};
pub use mnemonic::{RecoveryPhrase, RECOVERY_WORD_COUNT};
pub use payload::Credentials;
pub use vault::{DecryptedRecovery, KitStatus, RecoveryVault};
