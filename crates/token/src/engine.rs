//! Issue / validate / parse / renew / revoke
//!
//! Validation runs a fixed check order and short-circuits on the first
//! failure: revocation, signature (current then previous key), payload,
//! audience, issuer, expiry. Validation never writes to the cache; only
//! the metrics counters move.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use payguard_cache::CacheLayer;
use payguard_core::{ClientId, Token, TokenConfig, TokenError, TokenId, TokenResult};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::claims::Claims;
use crate::keys::SigningKeys;
use crate::revocation::RevocationSet;

/// Issue/validate/revoke counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenMetrics {
    /// Tokens issued
    pub issued: u64,
    /// Validations that passed
    pub validated: u64,
    /// Validations that failed
    pub rejected: u64,
    /// Token ids newly revoked
    pub revoked: u64,
}

#[derive(Debug, Default)]
struct MetricCounters {
    issued: AtomicU64,
    validated: AtomicU64,
    rejected: AtomicU64,
    revoked: AtomicU64,
}

/// Signed bearer token engine
pub struct TokenEngine {
    config: TokenConfig,
    keys: SigningKeys,
    revocations: RevocationSet,
    cache: CacheLayer,
    metrics: MetricCounters,
}

impl TokenEngine {
    /// Wires the engine from its collaborators.
    ///
    /// The revocation marker TTL defaults to the configured token TTL: no
    /// marker needs to outlive the longest-lived token it could shadow.
    pub fn new(config: TokenConfig, keys: SigningKeys, cache: CacheLayer) -> Self {
        let revocations = RevocationSet::new(cache.clone(), config.ttl());
        Self {
            config,
            keys,
            revocations,
            cache,
            metrics: MetricCounters::default(),
        }
    }

    /// Issues a token for an already-authenticated client.
    ///
    /// `permissions: None` grants the default set. The token is cached
    /// under both key forms; a cache failure downgrades to an uncached
    /// token, never to an issuance failure.
    pub async fn issue(
        &self,
        client_id: &ClientId,
        permissions: Option<Vec<String>>,
    ) -> TokenResult<Token> {
        let issued_at = Utc::now();
        let expires_at = issued_at
            + chrono::Duration::from_std(self.config.ttl())
                .map_err(|e| TokenError::Signing(e.to_string()))?;
        let token_id = TokenId::generate();
        let permissions = permissions.unwrap_or_else(Token::default_permissions);

        let claims = Claims::new(
            client_id,
            &token_id,
            &self.config.issuer,
            &self.config.audience,
            issued_at,
            expires_at,
            permissions.clone(),
        );

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.keys.current_kid());
        let token_string = jsonwebtoken::encode(&header, &claims, &self.keys.encoding_key())
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        let token = Token::new(
            token_id,
            client_id.clone(),
            issued_at,
            expires_at,
            permissions,
            token_string,
        )
        .map_err(|e| TokenError::Signing(e.to_string()))?;

        if !self.cache.put_token(&token).await {
            debug!(client_id = %client_id, "issued token could not be cached");
        }

        self.metrics.issued.fetch_add(1, Ordering::Relaxed);
        debug!(client_id = %client_id, token_id = %token.token_id, "token issued");
        Ok(token)
    }

    /// Validates a token string against the full check order.
    pub async fn validate(&self, token_string: &str) -> bool {
        self.check(token_string, false).await.is_ok()
    }

    /// Parses a token string, returning the token when every check passes.
    pub async fn parse(&self, token_string: &str) -> Option<Token> {
        self.check(token_string, false).await.ok()
    }

    /// Parses a token string, accepting expired-but-otherwise-valid tokens.
    ///
    /// The refresh path needs the parsed form of an expired token; every
    /// other check (revocation, signature, audience, issuer) still applies.
    pub async fn parse_lenient(&self, token_string: &str) -> TokenResult<Token> {
        self.check(token_string, true).await
    }

    /// Renews a token.
    ///
    /// A not-yet-expired token is returned unchanged. An expired token must
    /// still carry a valid signature and an unrevoked id; its id is revoked
    /// and a fresh token with the same permissions is issued.
    pub async fn renew(&self, token_string: &str) -> TokenResult<Token> {
        let token = self.check(token_string, true).await?;

        if !token.is_expired(Utc::now()) {
            return Ok(token);
        }

        self.revoke(&token.token_id).await;
        let renewed = self
            .issue(&token.client_id, Some(token.permissions.clone()))
            .await?;
        debug!(
            client_id = %token.client_id,
            old_token_id = %token.token_id,
            new_token_id = %renewed.token_id,
            "token renewed"
        );
        Ok(renewed)
    }

    /// Revokes a token id and drops its cache entry.
    ///
    /// Idempotent. The durable marker's TTL follows the cached token's
    /// remaining lifetime when the entry is still around.
    pub async fn revoke(&self, token_id: &TokenId) {
        let remaining = match self.cache.get_token_by_id(token_id).await {
            Some(token) => token.remaining_lifetime(Utc::now()).to_std().ok(),
            None => None,
        };

        if self.revocations.revoke(token_id, remaining).await {
            self.metrics.revoked.fetch_add(1, Ordering::Relaxed);
        }
        self.cache.invalidate_tokens_batch(&[token_id.clone()]).await;
    }

    /// Installs a new signing key, demoting the current one to previous.
    pub fn install_key(&self, new: payguard_core::SigningKeyMaterial) {
        self.keys.install_key(new);
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> TokenMetrics {
        TokenMetrics {
            issued: self.metrics.issued.load(Ordering::Relaxed),
            validated: self.metrics.validated.load(Ordering::Relaxed),
            rejected: self.metrics.rejected.load(Ordering::Relaxed),
            revoked: self.metrics.revoked.load(Ordering::Relaxed),
        }
    }

    /// Shared revocation set (the auth service consults it on revoke paths).
    pub fn revocations(&self) -> &RevocationSet {
        &self.revocations
    }

    /// The ordered check chain behind validate/parse/renew.
    async fn check(&self, token_string: &str, allow_expired: bool) -> TokenResult<Token> {
        let result = self.check_inner(token_string, allow_expired).await;
        match &result {
            Ok(_) => {
                self.metrics.validated.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "token rejected");
            }
        }
        result
    }

    async fn check_inner(&self, token_string: &str, allow_expired: bool) -> TokenResult<Token> {
        // (a) revocation, using the unverified jti peek. An attacker cannot
        // gain anything here: a forged jti only ever widens the deny set.
        let unverified = peek_claims(token_string)?;
        let token_id =
            TokenId::new(unverified.jti.as_str()).map_err(|e| TokenError::Malformed(e.to_string()))?;
        if self.revocations.is_revoked(&token_id).await {
            return Err(TokenError::Revoked {
                token_id: token_id.to_string(),
            });
        }

        // (b) signature with the current key, then the previous one.
        let claims = self.verify_signature(token_string)?;
        let audience = claims.aud.clone();
        let issuer = claims.iss.clone();

        // (c) payload shape: numeric timestamps in range, parsable ids.
        let token = claims.into_token(token_string.to_string())?;

        // (d) audience.
        if audience != self.config.audience {
            return Err(TokenError::AudienceMismatch);
        }

        // (e) issuer against the accepted set.
        if !self.config.issuer_set().contains(&issuer) {
            return Err(TokenError::IssuerMismatch);
        }

        // (f) expiry, strict (no leeway).
        if !allow_expired && token.is_expired(Utc::now()) {
            return Err(TokenError::Expired);
        }

        Ok(token)
    }

    fn verify_signature(&self, token_string: &str) -> TokenResult<Claims> {
        let validation = signature_only_validation();
        let mut last = TokenError::InvalidSignature;

        for (kid, key) in self.keys.decoding_keys() {
            match jsonwebtoken::decode::<Claims>(token_string, &key, &validation) {
                Ok(data) => {
                    if kid != self.keys.current_kid() {
                        warn!(kid = %kid, "token verified with previous signing key");
                    }
                    return Ok(data.claims);
                }
                Err(e) => match e.kind() {
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        last = TokenError::InvalidSignature;
                    }
                    _ => return Err(TokenError::Malformed(e.to_string())),
                },
            }
        }
        Err(last)
    }
}

/// Validation settings that check the signature and nothing else; the
/// engine runs the remaining checks itself in the contractual order.
fn signature_only_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    validation.leeway = 0;
    validation
}

/// Decodes claims without verifying the signature (revocation peek only).
fn peek_claims(token_string: &str) -> TokenResult<Claims> {
    let mut validation = signature_only_validation();
    validation.insecure_disable_signature_validation();
    jsonwebtoken::decode::<Claims>(token_string, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| TokenError::Malformed(e.to_string()))
}
