//! Recovered credentials
//!
//! The plaintext sealed inside a container is a discriminated union: a
//! password alone, or a password plus keyfile bytes. Secret buffers are
//! zeroed on drop on every path, including early returns on error, and
//! `Debug` never prints them.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize, Serializer};
use zeroize::Zeroizing;

use super::errors::{RecoveryError, RecoveryResult};
use crate::identity::VolumeIdentity;

/// Plaintext payload format version
const PAYLOAD_VERSION: u8 = 1;

/// Credentials that unlock the payload volume
pub enum Credentials {
    /// Password only (includes token-derived passwords)
    PasswordOnly { password: Zeroizing<String> },
    /// Password plus keyfile
    PasswordAndKeyfile {
        password: Zeroizing<String>,
        keyfile: Zeroizing<Vec<u8>>,
    },
}

impl Credentials {
    pub fn password_only(password: impl Into<String>) -> Self {
        Credentials::PasswordOnly {
            password: Zeroizing::new(password.into()),
        }
    }

    /// Build from raw parts. Empty keyfile bytes mean password only.
    pub fn from_parts(password: String, keyfile: Vec<u8>) -> Self {
        let password = Zeroizing::new(password);
        if keyfile.is_empty() {
            Credentials::PasswordOnly { password }
        } else {
            Credentials::PasswordAndKeyfile {
                password,
                keyfile: Zeroizing::new(keyfile),
            }
        }
    }

    pub fn password(&self) -> &str {
        match self {
            Credentials::PasswordOnly { password }
            | Credentials::PasswordAndKeyfile { password, .. } => password,
        }
    }

    /// Keyfile bytes; empty for password-only credentials
    pub fn keyfile_bytes(&self) -> &[u8] {
        match self {
            Credentials::PasswordOnly { .. } => &[],
            Credentials::PasswordAndKeyfile { keyfile, .. } => keyfile,
        }
    }

    /// Shape name, safe to log
    pub fn kind(&self) -> &'static str {
        match self {
            Credentials::PasswordOnly { .. } => "password_only",
            Credentials::PasswordAndKeyfile { .. } => "password_keyfile",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials::{}(<redacted>)", self.kind())
    }
}

#[derive(Serialize)]
struct PayloadOut<'a> {
    version: u8,
    volume_identity: &'a str,
    credentials: CredentialsOut<'a>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CredentialsOut<'a> {
    PasswordOnly {
        password: &'a str,
    },
    PasswordKeyfile {
        password: &'a str,
        #[serde(serialize_with = "serialize_base64")]
        keyfile: &'a [u8],
    },
}

#[derive(Deserialize)]
struct PayloadIn {
    version: u8,
    volume_identity: String,
    credentials: CredentialsIn,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CredentialsIn {
    PasswordOnly { password: String },
    PasswordKeyfile { password: String, keyfile: String },
}

fn serialize_base64<S: Serializer>(bytes: &&[u8], serializer: S) -> Result<S::Ok, S::Error> {
    let encoded = Zeroizing::new(BASE64.encode(bytes));
    serializer.serialize_str(&encoded)
}

/// Serialize the plaintext bound to `volume_identity`.
pub(crate) fn encode_payload(
    volume_identity: &VolumeIdentity,
    credentials: &Credentials,
) -> RecoveryResult<Zeroizing<Vec<u8>>> {
    let credentials = match credentials {
        Credentials::PasswordOnly { password } => CredentialsOut::PasswordOnly { password },
        Credentials::PasswordAndKeyfile { password, keyfile } => {
            CredentialsOut::PasswordKeyfile { password, keyfile }
        }
    };
    let payload = PayloadOut {
        version: PAYLOAD_VERSION,
        volume_identity: volume_identity.as_str(),
        credentials,
    };
    serde_json::to_vec(&payload)
        .map(Zeroizing::new)
        .map_err(|_| RecoveryError::Encryption)
}

/// Parse decrypted plaintext into its bound identity and credentials.
pub(crate) fn decode_payload(plaintext: &[u8]) -> RecoveryResult<(VolumeIdentity, Credentials)> {
    let payload: PayloadIn = serde_json::from_slice(plaintext)
        .map_err(|e| RecoveryError::CorruptContainer(format!("payload: {}", e)))?;
    if payload.version != PAYLOAD_VERSION {
        return Err(RecoveryError::CorruptContainer(format!(
            "unsupported payload version {}",
            payload.version
        )));
    }
    let identity = VolumeIdentity::parse(&payload.volume_identity)
        .map_err(|e| RecoveryError::CorruptContainer(e.to_string()))?;

    let credentials = match payload.credentials {
        CredentialsIn::PasswordOnly { password } => Credentials::PasswordOnly {
            password: Zeroizing::new(password),
        },
        CredentialsIn::PasswordKeyfile { password, keyfile } => {
            let password = Zeroizing::new(password);
            let encoded = Zeroizing::new(keyfile);
            let bytes = BASE64
                .decode(encoded.as_bytes())
                .map_err(|e| RecoveryError::CorruptContainer(format!("keyfile: {}", e)))?;
            Credentials::PasswordAndKeyfile {
                password,
                keyfile: Zeroizing::new(bytes),
            }
        }
    };
    Ok((identity, credentials))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> VolumeIdentity {
        VolumeIdentity::parse("aa11bb22cc33dd44ee55ff6600778899").unwrap()
    }

    #[test]
    fn test_empty_keyfile_means_password_only() {
        let creds = Credentials::from_parts("Sup3rSecret!".into(), Vec::new());
        assert_eq!(creds.kind(), "password_only");
        assert_eq!(creds.password(), "Sup3rSecret!");
        assert!(creds.keyfile_bytes().is_empty());
    }

    #[test]
    fn test_keyfile_payload_survives_encoding() {
        let creds = Credentials::from_parts("pw".into(), vec![0, 255, 7, 42]);
        let plaintext = encode_payload(&identity(), &creds).unwrap();
        let (bound, decoded) = decode_payload(&plaintext).unwrap();

        assert_eq!(bound, identity());
        assert_eq!(decoded.kind(), "password_keyfile");
        assert_eq!(decoded.password(), "pw");
        assert_eq!(decoded.keyfile_bytes(), &[0, 255, 7, 42]);
    }

    #[test]
    fn test_debug_is_redacted() {
        let creds = Credentials::password_only("Sup3rSecret!");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("Sup3rSecret!"));
        assert!(debug.contains("password_only"));
    }

    #[test]
    fn test_unknown_payload_version_rejected() {
        let raw = br#"{"version":9,"volume_identity":"aa11bb22cc33dd44ee55ff6600778899","credentials":{"kind":"password_only","password":"x"}}"#;
        assert!(matches!(
            decode_payload(raw),
            Err(RecoveryError::CorruptContainer(_))
        ));
    }
}
