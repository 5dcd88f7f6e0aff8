//! Signing key material stored in the vault
//!
//! The token engine signs with the `current` entry and verifies with
//! `current` or `previous`, which is what allows signing-key rollover
//! without invalidating in-flight tokens.

use serde::{Deserialize, Serialize};

use crate::secret::SecretString;

/// One HMAC signing secret with its key id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningKeyMaterial {
    /// Key identifier (logged; never the secret itself)
    pub kid: String,

    /// The HMAC-SHA256 secret
    pub secret: SecretString,
}

impl SigningKeyMaterial {
    /// Creates key material from a key id and secret.
    pub fn new(kid: impl Into<String>, secret: SecretString) -> Self {
        Self {
            kid: kid.into(),
            secret,
        }
    }

    /// Generates fresh random key material under the given key id.
    pub fn generate(kid: impl Into<String>) -> Self {
        Self::new(kid, SecretString::generate())
    }
}

/// The signing-key document at `payment/api/keys/token-signing`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningKeySet {
    /// Key used for issuance and first verification attempt
    pub current: SigningKeyMaterial,

    /// Kept valid for verification during key rollover
    pub previous: Option<SigningKeyMaterial>,
}

impl SigningKeySet {
    /// A key set with no rollover predecessor.
    pub fn single(current: SigningKeyMaterial) -> Self {
        Self {
            current,
            previous: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_material_differs_per_key() {
        let a = SigningKeyMaterial::generate("k1");
        let b = SigningKeyMaterial::generate("k2");
        assert!(!a.secret.ct_eq(&b.secret));
    }

    #[test]
    fn serde_round_trip() {
        let set = SigningKeySet::single(SigningKeyMaterial::generate("2026-08"));
        let json = serde_json::to_string(&set).unwrap();
        let back: SigningKeySet = serde_json::from_str(&json).unwrap();
        assert_eq!(back.current.kid, "2026-08");
        assert!(back.previous.is_none());
    }
}
