//! JWS claims layout
//!
//! The downstream authorization contract: `sub` is the authenticated
//! client, `jti` the revocation handle, `permissions` the granted actions.

use chrono::{DateTime, TimeZone, Utc};
use payguard_core::{ClientId, Token, TokenError, TokenId, TokenResult};
use serde::{Deserialize, Serialize};

/// Claims carried by every issued token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Authenticated client id
    pub sub: String,

    /// Issuing gateway
    pub iss: String,

    /// Intended consumer
    pub aud: String,

    /// Issued-at, seconds since epoch
    pub iat: i64,

    /// Expiry, seconds since epoch
    pub exp: i64,

    /// Unique token id
    pub jti: String,

    /// Granted permissions
    pub permissions: Vec<String>,
}

impl Claims {
    /// Claims for a fresh token.
    pub fn new(
        client_id: &ClientId,
        token_id: &TokenId,
        issuer: &str,
        audience: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        permissions: Vec<String>,
    ) -> Self {
        Self {
            sub: client_id.to_string(),
            iss: issuer.to_string(),
            aud: audience.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: token_id.to_string(),
            permissions,
        }
    }

    /// Issued-at as a UTC timestamp.
    pub fn issued_at(&self) -> TokenResult<DateTime<Utc>> {
        timestamp(self.iat)
    }

    /// Expiry as a UTC timestamp.
    pub fn expires_at(&self) -> TokenResult<DateTime<Utc>> {
        timestamp(self.exp)
    }

    /// Rebuilds the parsed [`Token`] these claims describe.
    pub fn into_token(self, token_string: String) -> TokenResult<Token> {
        let issued_at = self.issued_at()?;
        let expires_at = self.expires_at()?;
        let client_id =
            ClientId::new(self.sub.as_str()).map_err(|e| TokenError::Malformed(e.to_string()))?;
        let token_id =
            TokenId::new(self.jti.as_str()).map_err(|e| TokenError::Malformed(e.to_string()))?;

        Token::new(
            token_id,
            client_id,
            issued_at,
            expires_at,
            self.permissions,
            token_string,
        )
        .map_err(|e| TokenError::Malformed(e.to_string()))
    }
}

fn timestamp(seconds: i64) -> TokenResult<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| TokenError::Malformed(format!("timestamp {seconds} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn claims_round_trip_into_token() {
        let now = Utc::now();
        let client = ClientId::new("acme").unwrap();
        let id = TokenId::generate();
        let claims = Claims::new(
            &client,
            &id,
            "payguard",
            "payment-api",
            now,
            now + Duration::seconds(60),
            vec!["process_payment".into()],
        );

        let token = claims.into_token("a.b.c".into()).unwrap();
        assert_eq!(token.client_id, client);
        assert_eq!(token.token_id, id);
        assert_eq!(token.permissions, vec!["process_payment"]);
        // Sub-second precision is dropped at the claims boundary.
        assert_eq!(token.issued_at.timestamp(), now.timestamp());
    }

    #[test]
    fn malformed_subject_is_rejected() {
        let now = Utc::now();
        let claims = Claims {
            sub: "../escape".into(),
            iss: "payguard".into(),
            aud: "payment-api".into(),
            iat: now.timestamp(),
            exp: now.timestamp() + 60,
            jti: "id".into(),
            permissions: Vec::new(),
        };
        assert!(claims.into_token(String::new()).is_err());
    }
}
