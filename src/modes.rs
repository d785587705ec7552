//! Security modes
//!
//! The mode decides which credential factors unlock the payload volume. It
//! is a closed sum type; every consumer matches it exhaustively so a new
//! mode is a compile error wherever it matters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::recovery::Credentials;

/// How the payload volume is unlocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SecurityMode {
    /// Password only
    PasswordOnly,
    /// Password plus a plain keyfile
    PasswordKeyfile,
    /// Password plus a keyfile encrypted to a hardware token
    TokenKeyfile,
    /// Password derived from a hardware token, no keyfile
    TokenDerivedPassword,
}

impl SecurityMode {
    /// All modes in presentation order
    pub const ALL: [SecurityMode; 4] = [
        SecurityMode::PasswordOnly,
        SecurityMode::PasswordKeyfile,
        SecurityMode::TokenKeyfile,
        SecurityMode::TokenDerivedPassword,
    ];

    /// Config string
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityMode::PasswordOnly => "pw_only",
            SecurityMode::PasswordKeyfile => "pw_keyfile",
            SecurityMode::TokenKeyfile => "pw_gpg_keyfile",
            SecurityMode::TokenDerivedPassword => "gpg_pw_only",
        }
    }

    /// Parse a config string, including names written by older releases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pw_only" | "password" | "password_only" => Some(SecurityMode::PasswordOnly),
            "pw_keyfile" | "keyfile" => Some(SecurityMode::PasswordKeyfile),
            "pw_gpg_keyfile" | "yubikey" | "gpg_keyfile" => Some(SecurityMode::TokenKeyfile),
            "gpg_pw_only" | "gpg_password" => Some(SecurityMode::TokenDerivedPassword),
            _ => None,
        }
    }

    /// Whether the unlock needs keyfile bytes
    pub fn requires_keyfile(&self) -> bool {
        match self {
            SecurityMode::PasswordKeyfile | SecurityMode::TokenKeyfile => true,
            SecurityMode::PasswordOnly | SecurityMode::TokenDerivedPassword => false,
        }
    }

    /// Whether `credentials` has the shape this mode unlocks with.
    pub fn accepts(&self, credentials: &Credentials) -> bool {
        match credentials {
            Credentials::PasswordOnly { .. } => !self.requires_keyfile(),
            Credentials::PasswordAndKeyfile { .. } => self.requires_keyfile(),
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown security mode {:?}", s))
    }
}

impl TryFrom<String> for SecurityMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SecurityMode> for String {
    fn from(mode: SecurityMode) -> Self {
        mode.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_config_string() {
        for mode in SecurityMode::ALL {
            assert_eq!(SecurityMode::parse(mode.as_str()), Some(mode));
        }
    }

    #[test]
    fn test_legacy_names() {
        assert_eq!(SecurityMode::parse("yubikey"), Some(SecurityMode::TokenKeyfile));
        assert_eq!(SecurityMode::parse("KEYFILE"), Some(SecurityMode::PasswordKeyfile));
        assert_eq!(SecurityMode::parse("veracrypt"), None);
    }

    #[test]
    fn test_credential_shape() {
        let plain = Credentials::password_only("pw");
        let with_key = Credentials::from_parts("pw".to_string(), vec![1, 2, 3]);

        assert!(SecurityMode::PasswordOnly.accepts(&plain));
        assert!(SecurityMode::TokenDerivedPassword.accepts(&plain));
        assert!(!SecurityMode::PasswordKeyfile.accepts(&plain));
        assert!(SecurityMode::TokenKeyfile.accepts(&with_key));
        assert!(!SecurityMode::PasswordOnly.accepts(&with_key));
    }

    #[test]
    fn test_serde_writes_canonical_name() {
        let mode: SecurityMode = serde_json::from_str("\"yubikey\"").unwrap();
        assert_eq!(serde_json::to_string(&mode).unwrap(), "\"pw_gpg_keyfile\"");
    }
}
