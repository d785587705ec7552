//! Recovery container format
//!
//! ```text
//! +----------------------+
//! | Magic "SDRC"         | 4 bytes
//! | Format version       | u8
//! | KDF algorithm id     | u8 (1 = Argon2id)
//! | Memory KiB           | u32 LE
//! | Iterations           | u32 LE
//! | Parallelism          | u32 LE
//! | Salt                 | 16 bytes
//! | Nonce                | 24 bytes
//! | Volume identity      | 32 ASCII hex
//! +----------------------+  <- header end, authenticated as AAD
//! | Ciphertext length    | u32 LE
//! | Ciphertext + tag     | variable
//! +----------------------+
//! | CRC32                | u32 LE
//! +----------------------+
//! ```
//!
//! The CRC covers every byte before it and catches paper transcription
//! damage before any key derivation. Authenticity comes from the AEAD tag;
//! the bound identity inside the plaintext is what recovery checks.

use std::fs;
use std::io;
use std::path::Path;

use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;

use super::errors::{RecoveryError, RecoveryResult};
use super::kdf::{derive_key, KdfParams, KDF_ALGORITHM_ARGON2ID, SALT_LEN};
use super::mnemonic::RecoveryPhrase;
use super::payload::{decode_payload, encode_payload, Credentials};
use crate::digest::crc32;
use crate::identity::{VolumeIdentity, VOLUME_IDENTITY_HEX_LEN};
use crate::persistence::write_bytes_atomic;

/// Container magic
pub const CONTAINER_MAGIC: &[u8; 4] = b"SDRC";

/// Container format version
pub const CONTAINER_VERSION: u8 = 1;

/// XChaCha20 nonce length
pub const NONCE_LEN: usize = 24;

const HEADER_LEN: usize = 4 + 1 + 1 + 4 + 4 + 4 + SALT_LEN + NONCE_LEN + VOLUME_IDENTITY_HEX_LEN;
const TAG_LEN: usize = 16;
const MAX_CIPHERTEXT_LEN: usize = 1024 * 1024;

/// Largest well-formed container: header, ciphertext length, ciphertext, CRC
pub(crate) const MAX_CONTAINER_LEN: usize = HEADER_LEN + 4 + MAX_CIPHERTEXT_LEN + 4;

/// An encrypted, volume-bound credential container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryContainer {
    kdf: KdfParams,
    salt: [u8; SALT_LEN],
    nonce: [u8; NONCE_LEN],
    volume_identity: VolumeIdentity,
    ciphertext: Vec<u8>,
}

impl RecoveryContainer {
    /// Encrypt `credentials` under a key derived from `phrase`, bound to
    /// `volume_identity`.
    pub fn seal(
        phrase: &RecoveryPhrase,
        credentials: &Credentials,
        volume_identity: &VolumeIdentity,
        kdf: KdfParams,
    ) -> RecoveryResult<Self> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce);

        let mut container = Self {
            kdf,
            salt,
            nonce,
            volume_identity: volume_identity.clone(),
            ciphertext: Vec::new(),
        };

        let key = derive_key(phrase, &container.salt, &container.kdf)?;
        let plaintext = encode_payload(volume_identity, credentials)?;
        let header = container.header_bytes();

        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
        container.ciphertext = cipher
            .encrypt(
                XNonce::from_slice(&container.nonce),
                Payload {
                    msg: plaintext.as_slice(),
                    aad: &header,
                },
            )
            .map_err(|_| RecoveryError::Encryption)?;
        Ok(container)
    }

    /// Decrypt with `phrase` and check the bound identity against the live
    /// volume. Nothing on disk is touched.
    pub fn open(
        &self,
        phrase: &RecoveryPhrase,
        live_identity: &VolumeIdentity,
    ) -> RecoveryResult<Credentials> {
        let key = derive_key(phrase, &self.salt, &self.kdf)?;
        let header = self.header_bytes();

        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
        let plaintext = cipher
            .decrypt(
                XNonce::from_slice(&self.nonce),
                Payload {
                    msg: &self.ciphertext,
                    aad: &header,
                },
            )
            .map(zeroize::Zeroizing::new)
            .map_err(|_| RecoveryError::DecryptionFailed)?;

        let (bound, credentials) = decode_payload(&plaintext)?;
        if !bound.ct_eq(&self.volume_identity) {
            return Err(RecoveryError::CorruptContainer(
                "header identity disagrees with sealed identity".to_string(),
            ));
        }
        if !bound.ct_eq(live_identity) {
            return Err(RecoveryError::VolumeMismatch {
                expected: bound.to_string(),
                actual: live_identity.to_string(),
            });
        }
        Ok(credentials)
    }

    /// Volume this container is bound to
    pub fn volume_identity(&self) -> &VolumeIdentity {
        &self.volume_identity
    }

    pub fn kdf_params(&self) -> &KdfParams {
        &self.kdf
    }

    fn header_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        buf.extend_from_slice(CONTAINER_MAGIC);
        buf.push(CONTAINER_VERSION);
        buf.push(KDF_ALGORITHM_ARGON2ID);
        buf.extend_from_slice(&self.kdf.memory_kib().to_le_bytes());
        buf.extend_from_slice(&self.kdf.iterations().to_le_bytes());
        buf.extend_from_slice(&self.kdf.parallelism().to_le_bytes());
        buf.extend_from_slice(&self.salt);
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(self.volume_identity.as_str().as_bytes());
        buf
    }

    /// Serialize to the on-disk format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = self.header_bytes();
        buf.extend_from_slice(&(self.ciphertext.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.ciphertext);
        let checksum = crc32(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Parse the on-disk format. The checksum is verified first.
    pub fn from_bytes(bytes: &[u8]) -> RecoveryResult<Self> {
        if bytes.len() < HEADER_LEN + 4 + TAG_LEN + 4 {
            return Err(corrupt(format!("container truncated ({} bytes)", bytes.len())));
        }

        let (body, stored) = bytes.split_at(bytes.len() - 4);
        let stored = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
        let computed = crc32(body);
        if stored != computed {
            return Err(corrupt(format!(
                "checksum mismatch: stored {:08x}, computed {:08x}",
                stored, computed
            )));
        }

        let mut reader = Reader::new(body);
        if reader.take(4)? != CONTAINER_MAGIC {
            return Err(corrupt("bad magic".to_string()));
        }
        let version = reader.u8()?;
        if version != CONTAINER_VERSION {
            return Err(corrupt(format!("unsupported container version {}", version)));
        }
        let algorithm = reader.u8()?;
        if algorithm != KDF_ALGORITHM_ARGON2ID {
            return Err(corrupt(format!("unsupported KDF algorithm {}", algorithm)));
        }

        let memory_kib = reader.u32()?;
        let iterations = reader.u32()?;
        let parallelism = reader.u32()?;
        let kdf = KdfParams::new(memory_kib, iterations, parallelism)
            .map_err(|e| corrupt(e.to_string()))?;

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(reader.take(SALT_LEN)?);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(reader.take(NONCE_LEN)?);

        let identity_raw = std::str::from_utf8(reader.take(VOLUME_IDENTITY_HEX_LEN)?)
            .map_err(|_| corrupt("volume identity is not ASCII".to_string()))?;
        let volume_identity =
            VolumeIdentity::parse(identity_raw).map_err(|e| corrupt(e.to_string()))?;

        let ct_len = reader.u32()? as usize;
        if ct_len < TAG_LEN || ct_len > MAX_CIPHERTEXT_LEN {
            return Err(corrupt(format!("ciphertext length {} out of range", ct_len)));
        }
        let ciphertext = reader.take(ct_len)?.to_vec();
        if !reader.is_empty() {
            return Err(corrupt("trailing bytes after ciphertext".to_string()));
        }

        Ok(Self {
            kdf,
            salt,
            nonce,
            volume_identity,
            ciphertext,
        })
    }

    /// Read and parse a container file.
    pub fn read_from(path: &Path) -> RecoveryResult<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RecoveryError::ContainerMissing(path.to_path_buf()))
            }
            Err(e) => {
                return Err(RecoveryError::io(
                    format!("failed to read {}", path.display()),
                    e,
                ))
            }
        };
        Self::from_bytes(&bytes)
    }

    /// Atomically write the container to `path`.
    pub fn write_to(&self, path: &Path) -> RecoveryResult<()> {
        write_bytes_atomic(path, &self.to_bytes())?;
        Ok(())
    }
}

fn corrupt(message: String) -> RecoveryError {
    RecoveryError::CorruptContainer(message)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> RecoveryResult<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.buf.len());
        match end {
            Some(end) => {
                let slice = &self.buf[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(corrupt(format!("unexpected end of container at offset {}", self.pos))),
        }
    }

    fn u8(&mut self) -> RecoveryResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> RecoveryResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams::new(64, 1, 1).unwrap()
    }

    fn identity(hex: &str) -> VolumeIdentity {
        VolumeIdentity::parse(hex).unwrap()
    }

    fn sealed() -> (RecoveryPhrase, RecoveryContainer) {
        let phrase = RecoveryPhrase::generate().unwrap();
        let container = RecoveryContainer::seal(
            &phrase,
            &Credentials::password_only("Sup3rSecret!"),
            &identity("aa11bb22cc33dd44ee55ff6600778899"),
            fast(),
        )
        .unwrap();
        (phrase, container)
    }

    #[test]
    fn test_open_with_correct_phrase() {
        let (phrase, container) = sealed();
        let creds = container
            .open(&phrase, &identity("aa11bb22cc33dd44ee55ff6600778899"))
            .unwrap();
        assert_eq!(creds.password(), "Sup3rSecret!");
        assert!(creds.keyfile_bytes().is_empty());
    }

    #[test]
    fn test_other_phrase_fails_authentication() {
        let (_, container) = sealed();
        let other = RecoveryPhrase::generate().unwrap();
        let err = container
            .open(&other, &identity("aa11bb22cc33dd44ee55ff6600778899"))
            .unwrap_err();
        assert!(matches!(err, RecoveryError::DecryptionFailed));
    }

    #[test]
    fn test_other_volume_rejected() {
        let (phrase, container) = sealed();
        let err = container
            .open(&phrase, &identity("00000000000000000000000000000000"))
            .unwrap_err();
        assert!(matches!(err, RecoveryError::VolumeMismatch { .. }));
    }

    #[test]
    fn test_bytes_parse_back() {
        let (phrase, container) = sealed();
        let parsed = RecoveryContainer::from_bytes(&container.to_bytes()).unwrap();
        assert_eq!(parsed, container);
        assert!(parsed
            .open(&phrase, &identity("aa11bb22cc33dd44ee55ff6600778899"))
            .is_ok());
    }

    #[test]
    fn test_bit_flip_caught_by_checksum() {
        let (_, container) = sealed();
        let mut bytes = container.to_bytes();
        bytes[HEADER_LEN + 10] ^= 0x01;
        let err = RecoveryContainer::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, RecoveryError::CorruptContainer(_)));
    }

    #[test]
    fn test_header_tamper_fails_authentication() {
        let (phrase, container) = sealed();
        let mut tampered = container.clone();
        tampered.nonce[0] ^= 0xff;
        // Re-serialised, so the checksum is valid and only the AEAD can notice.
        let reparsed = RecoveryContainer::from_bytes(&tampered.to_bytes()).unwrap();
        let err = reparsed
            .open(&phrase, &identity("aa11bb22cc33dd44ee55ff6600778899"))
            .unwrap_err();
        assert!(matches!(err, RecoveryError::DecryptionFailed));
    }

    #[test]
    fn test_truncated_container_rejected() {
        let (_, container) = sealed();
        let bytes = container.to_bytes();
        assert!(RecoveryContainer::from_bytes(&bytes[..HEADER_LEN]).is_err());
    }

    #[test]
    fn test_missing_file_is_container_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = RecoveryContainer::read_from(&dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, RecoveryError::ContainerMissing(_)));
    }
}
