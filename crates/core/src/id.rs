//! Validated identifier newtypes
//!
//! [`ClientId`] guards the strings that end up in vault paths and cache
//! keys against traversal and injection; [`TokenId`] is the random `jti`
//! carried by every issued token.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum length for client IDs (prevents oversized vault paths)
const MAX_CLIENT_ID_LENGTH: usize = 255;

/// External vendor client identifier (validated)
///
/// Only alphanumeric characters, hyphens, and underscores are allowed so a
/// client id can be embedded in vault paths and cache keys verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    /// Creates a validated client id.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyClientId`] for empty or
    /// whitespace-only input, [`ValidationError::InvalidClientId`] for
    /// oversized input or disallowed characters.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();

        if id.trim().is_empty() {
            return Err(ValidationError::EmptyClientId);
        }

        if id.len() > MAX_CLIENT_ID_LENGTH {
            return Err(ValidationError::InvalidClientId {
                id,
                reason: format!("exceeds maximum length of {MAX_CLIENT_ID_LENGTH} characters"),
            });
        }

        if !id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidClientId {
                id,
                reason: "contains invalid characters (only alphanumeric, hyphens, underscores allowed)"
                    .to_string(),
            });
        }

        Ok(Self(id))
    }

    /// Returns the client id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ClientId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClientId> for String {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

/// Unique token identifier (`jti` claim)
///
/// Freshly generated ids are v4 UUIDs, which carry 122 bits of entropy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenId(String);

impl TokenId {
    /// Generates a fresh random token id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing id (e.g. parsed from a token's `jti` claim).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyTokenId`] for empty input.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyTokenId);
        }
        Ok(Self(id))
    }

    /// Returns the token id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TokenId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TokenId> for String {
    fn from(id: TokenId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_accepts_safe_characters() {
        assert!(ClientId::new("acme").is_ok());
        assert!(ClientId::new("acme-payments_2").is_ok());
    }

    #[test]
    fn client_id_rejects_empty_and_whitespace() {
        assert!(matches!(
            ClientId::new(""),
            Err(ValidationError::EmptyClientId)
        ));
        assert!(matches!(
            ClientId::new("   "),
            Err(ValidationError::EmptyClientId)
        ));
    }

    #[test]
    fn client_id_rejects_path_traversal() {
        assert!(ClientId::new("../etc/passwd").is_err());
        assert!(ClientId::new("acme/other").is_err());
        assert!(ClientId::new("acme payments").is_err());
    }

    #[test]
    fn client_id_rejects_oversized_input() {
        let long = "a".repeat(MAX_CLIENT_ID_LENGTH + 1);
        assert!(ClientId::new(long).is_err());
    }

    #[test]
    fn token_id_generation_is_unique() {
        let a = TokenId::generate();
        let b = TokenId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn token_id_rejects_empty() {
        assert!(TokenId::new("").is_err());
    }
}
