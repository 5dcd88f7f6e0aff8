//! The gateway entry point
//!
//! Composes cache, resolver, and token engine behind the contract the
//! outer HTTP handlers consume: authenticate (with single-flight
//! deduplication and a hard wall-clock budget), header extraction, token
//! validation, refresh, and per-client revocation.
//!
//! Failure policy: invalid input is rejected before any backend call;
//! credential mismatches are uniform regardless of cause; vault outages
//! degrade through the cache and only surface when the fallback is cold.

use chrono::Utc;
use payguard_cache::CacheLayer;
use payguard_core::{
    AuthConfig, ClientId, GatewayError, GatewayResult, SecretString, Token, TokenId, VaultError,
};
use payguard_token::TokenEngine;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::resolver::CredentialResolver;
use crate::singleflight::SingleFlight;

/// Header carrying the vendor client id
pub const CLIENT_ID_HEADER: &str = "X-Client-ID";

/// Header carrying the vendor client secret
pub const CLIENT_SECRET_HEADER: &str = "X-Client-Secret";

/// The authentication gateway service
pub struct AuthService {
    resolver: Arc<CredentialResolver>,
    engine: Arc<TokenEngine>,
    cache: CacheLayer,
    config: AuthConfig,
    flights: SingleFlight,
    shutdown: CancellationToken,
}

impl AuthService {
    /// Wires the service from its collaborators.
    pub fn new(
        resolver: Arc<CredentialResolver>,
        engine: Arc<TokenEngine>,
        cache: CacheLayer,
        config: AuthConfig,
    ) -> Self {
        Self {
            resolver,
            engine,
            cache,
            config,
            flights: SingleFlight::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Attaches a shutdown token; cancellation fails in-flight entry points
    /// closed instead of letting them run on.
    pub fn with_cancellation(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Authenticates a vendor and returns its bearer token.
    ///
    /// Cached tokens are served without touching the vault; otherwise the
    /// secret is validated (cache fallback on outage) and a fresh token is
    /// issued. The whole call is bounded by `auth.request_deadline_ms` and
    /// fails closed with `Timeout` on overrun.
    #[instrument(skip(self, client_secret))]
    pub async fn authenticate(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> GatewayResult<Token> {
        let budget = self.config.request_deadline();
        tokio::select! {
            outcome = tokio::time::timeout(budget, self.authenticate_inner(client_id, client_secret)) => {
                outcome.map_err(|_| {
                    warn!("authenticate exceeded its wall-clock budget");
                    GatewayError::Timeout { budget }
                })?
            }
            () = self.shutdown.cancelled() => {
                Err(GatewayError::Internal("shutdown in progress".into()))
            }
        }
    }

    async fn authenticate_inner(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> GatewayResult<Token> {
        let client_id = parse_client_id(client_id)?;
        let secret = SecretString::new(client_secret);
        if secret.is_blank() {
            return Err(GatewayError::InvalidInput("client secret is blank".into()));
        }

        // Fast path outside the single-flight.
        if let Some(token) = self.cache.get_token_by_client(&client_id).await {
            debug!(client_id = %client_id, "serving cached token");
            return Ok(token);
        }

        let _flight = self.flights.acquire(&client_id).await;

        // Re-check inside the flight: a loser observes the winner's token.
        if let Some(token) = self.cache.get_token_by_client(&client_id).await {
            debug!(client_id = %client_id, "serving token issued by concurrent authenticate");
            return Ok(token);
        }

        match self.resolver.validate_with_fallback(&client_id, &secret).await {
            Ok(true) => {}
            Ok(false) => {
                info!(client_id = %client_id, "authentication rejected");
                return Err(GatewayError::InvalidCredentials);
            }
            Err(VaultError::Unavailable { .. }) => {
                return Err(GatewayError::VaultUnavailable);
            }
            Err(e) => return Err(e.into()),
        }

        let token = self.engine.issue(&client_id, None).await?;
        info!(client_id = %client_id, token_id = %token.token_id, "authenticated, token issued");
        Ok(token)
    }

    /// [`AuthService::authenticate`] over `X-Client-ID` / `X-Client-Secret`
    /// headers. Absent or blank headers fail with `MissingCredentials`.
    pub async fn authenticate_headers(
        &self,
        headers: &HashMap<String, String>,
    ) -> GatewayResult<Token> {
        let client_id = header_value(headers, CLIENT_ID_HEADER)
            .ok_or(GatewayError::MissingCredentials)?;
        let client_secret = header_value(headers, CLIENT_SECRET_HEADER)
            .ok_or(GatewayError::MissingCredentials)?;
        self.authenticate(&client_id, &client_secret).await
    }

    /// Delegates to the token engine's full check chain.
    pub async fn validate_token(&self, token_string: &str) -> bool {
        self.engine.validate(token_string).await
    }

    /// Backing query for the token-status endpoint: seconds of life left
    /// for the token behind `token_id`, or `None` when the id is unknown,
    /// revoked, or expired. Never fails; malformed ids are simply unknown.
    pub async fn token_status(&self, token_id: &str) -> Option<u64> {
        let token_id = TokenId::new(token_id.trim()).ok()?;

        if self.engine.revocations().is_revoked(&token_id).await {
            return None;
        }

        let token = self.cache.get_token_by_id(&token_id).await?;
        let remaining = token.remaining_lifetime(Utc::now());
        if remaining.is_zero() {
            None
        } else {
            Some(remaining.num_seconds().max(0) as u64)
        }
    }

    /// Refreshes a token: un-expired tokens come back unchanged, expired
    /// ones are renewed (old id revoked) when the client is still in good
    /// standing.
    #[instrument(skip(self, token_string))]
    pub async fn refresh(&self, token_string: &str) -> GatewayResult<Token> {
        let token = self
            .engine
            .parse_lenient(token_string)
            .await
            .map_err(GatewayError::from)?;

        if !token.is_expired(Utc::now()) {
            return Ok(token);
        }

        // Renewal re-checks standing: a client deactivated since issuance
        // does not get a fresh token.
        let _flight = self.flights.acquire(&token.client_id).await;
        let standing = self
            .resolver
            .resolve_with_fallback(&token.client_id)
            .await
            .map_err(|e| match e {
                VaultError::Unavailable { .. } => GatewayError::VaultUnavailable,
                other => other.into(),
            })?;
        let client_usable =
            standing.is_some_and(|record| record.usable(Utc::now()).next().is_some());
        if !client_usable {
            warn!(client_id = %token.client_id, "refresh denied, client no longer in good standing");
            return Err(GatewayError::Unauthenticated);
        }

        let renewed = self.engine.renew(token_string).await?;
        info!(
            client_id = %renewed.client_id,
            token_id = %renewed.token_id,
            "token refreshed"
        );
        Ok(renewed)
    }

    /// Revokes whatever token a client currently holds and clears every
    /// cache key for it. Returns whether a token was actually revoked.
    #[instrument(skip(self))]
    pub async fn revoke_client(&self, client_id: &str) -> GatewayResult<bool> {
        let client_id = parse_client_id(client_id)?;
        let _flight = self.flights.acquire(&client_id).await;

        let held = self.cache.get_token_by_client(&client_id).await;
        if let Some(token) = &held {
            self.engine.revoke(&token.token_id).await;
        }
        self.cache.invalidate_client(&client_id).await;

        info!(client_id = %client_id, revoked = held.is_some(), "client revoked");
        Ok(held.is_some())
    }
}

fn parse_client_id(raw: &str) -> GatewayResult<ClientId> {
    ClientId::new(raw.trim()).map_err(GatewayError::from)
}

fn header_value(headers: &HashMap<String, String>, name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
