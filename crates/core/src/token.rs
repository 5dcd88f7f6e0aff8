//! Bearer token data model
//!
//! The parsed form of a signed bearer token as it moves between the token
//! engine, the cache, and the auth service. The serialized JWS string
//! travels alongside so downstream callers never re-encode.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::{ClientId, TokenId};

/// Permissions granted when the caller does not ask for a specific set
pub const DEFAULT_PERMISSIONS: [&str; 2] = ["process_payment", "view_status"];

/// A signed bearer token in parsed form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Unique token id (`jti`), the revocation handle
    pub token_id: TokenId,

    /// Authenticated client this token was issued to
    pub client_id: ClientId,

    /// Issuance timestamp (`iat`)
    pub issued_at: DateTime<Utc>,

    /// Expiry timestamp (`exp`), strictly after `issued_at`
    pub expires_at: DateTime<Utc>,

    /// Granted permissions, order-preserving and deduplicated
    pub permissions: Vec<String>,

    /// The serialized `<header>.<payload>.<signature>` string
    pub token_string: String,
}

impl Token {
    /// Assembles a token, enforcing `expires_at > issued_at` and deduping
    /// permissions while preserving their order.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonMonotonicExpiry`] when the expiry does
    /// not come strictly after issuance.
    pub fn new(
        token_id: TokenId,
        client_id: ClientId,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        permissions: Vec<String>,
        token_string: String,
    ) -> Result<Self, ValidationError> {
        if expires_at <= issued_at {
            return Err(ValidationError::NonMonotonicExpiry {
                issued_at: issued_at.to_rfc3339(),
                expires_at: expires_at.to_rfc3339(),
            });
        }

        let mut deduped: Vec<String> = Vec::with_capacity(permissions.len());
        for permission in permissions {
            if !deduped.contains(&permission) {
                deduped.push(permission);
            }
        }

        Ok(Self {
            token_id,
            client_id,
            issued_at,
            expires_at,
            permissions: deduped,
            token_string,
        })
    }

    /// The default permission set as owned strings.
    pub fn default_permissions() -> Vec<String> {
        DEFAULT_PERMISSIONS.iter().map(ToString::to_string).collect()
    }

    /// True once `expires_at` has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Time left before expiry; zero for expired tokens.
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}
