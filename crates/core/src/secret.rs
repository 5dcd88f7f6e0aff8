//! Zeroizing secret wrapper and salted-hash helpers
//!
//! [`SecretString`] holds plaintext secrets for the short window between
//! receiving them and hashing or comparing them; memory is wiped on drop
//! and `Debug`/`Display` never reveal the contents. Hashing uses Argon2id
//! with a per-secret random salt; verification is constant-time inside
//! `argon2` and callers equalize work across failure paths with
//! [`dummy_verify`].

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::ValidationError;

/// Number of random bytes in a generated client secret
const GENERATED_SECRET_BYTES: usize = 32;

/// Fixed salt for the dummy verification pass (never used for real hashes)
const DUMMY_SALT: &[u8] = b"payguard-timing-pad";

/// Plaintext secret with zeroize-on-drop semantics
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Wraps an existing plaintext secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Generates a fresh random secret (32 bytes, base64url-encoded).
    pub fn generate() -> Self {
        let mut bytes = [0u8; GENERATED_SECRET_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let encoded = URL_SAFE_NO_PAD.encode(bytes);
        bytes.zeroize();
        Self(encoded)
    }

    /// Exposes the plaintext. Callers must not persist the returned slice.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// True when the secret is empty or whitespace-only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Constant-time equality against another secret.
    pub fn ct_eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString(***)")
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Hashes a secret with Argon2id and a fresh random salt.
///
/// Returns the PHC-format hash string stored in the vault; the plaintext is
/// never persisted.
///
/// # Errors
///
/// Returns [`ValidationError::HashingFailed`] when the hasher rejects its
/// input (in practice only on allocation failure).
pub fn hash_secret(secret: &SecretString) -> Result<String, ValidationError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.expose().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ValidationError::HashingFailed(e.to_string()))
}

/// Verifies a presented secret against a stored PHC-format hash.
///
/// An unparseable stored hash counts as a mismatch; the comparison inside
/// `argon2` does not early-exit on the first differing byte.
pub fn verify_secret(secret: &SecretString, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.expose().as_bytes(), &parsed)
            .is_ok(),
        Err(_) => {
            dummy_verify(secret);
            false
        }
    }
}

/// Burns one Argon2 work unit without verifying anything.
///
/// Callers run this on paths where no real hash is available (unknown
/// client, fewer credential versions than the maximum) so the response time
/// does not reveal which path was taken.
pub fn dummy_verify(secret: &SecretString) {
    let mut out = [0u8; 32];
    let _ = Argon2::default().hash_password_into(secret.expose().as_bytes(), DUMMY_SALT, &mut out);
    out.zeroize();
}
