//! Typed operations over any [`CacheStore`]
//!
//! The layer owns the cache contract of the gateway: dual-keyed token
//! entries, credential records, revocation markers, TTL clamping, and the
//! degrade-to-absent policy. Every backend call is bounded by the
//! configured cache op deadline; deadline overrun counts as a backend
//! failure.

use chrono::Utc;
use payguard_core::{CacheConfig, CacheError, ClientId, CredentialRecord, Token, TokenId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::debug;

use crate::keys;
use crate::store::CacheStore;

/// Safety margin kept between an entry's TTL and its entity's expiry
const TTL_SAFETY_MARGIN: Duration = Duration::from_secs(30);

/// Floor for token entry TTLs after the margin is applied
const MIN_TOKEN_TTL: Duration = Duration::from_secs(10);

/// Typed cache surface shared by the token engine, resolver, and service
#[derive(Clone)]
pub struct CacheLayer {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
}

impl CacheLayer {
    /// Wraps a backend with the gateway's cache policy.
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    /// Runs one backend call under the op deadline, flattening timeout and
    /// backend failure into `Err`.
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        let deadline = self.config.op_deadline();
        match tokio::time::timeout(deadline, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                debug!(operation, error = %e, "cache backend error, degrading to absent");
                Err(e)
            }
            Err(_) => {
                debug!(operation, ?deadline, "cache op deadline exceeded, degrading to absent");
                Err(CacheError::Timeout { deadline })
            }
        }
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, CacheError> {
        serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Option<T> {
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!(error = %e, "undecodable cache entry, treating as absent");
                None
            }
        }
    }

    /// Entry TTL for a token: remaining lifetime minus the safety margin,
    /// floored at [`MIN_TOKEN_TTL`].
    fn token_entry_ttl(&self, token: &Token) -> Duration {
        let remaining = token
            .remaining_lifetime(Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        remaining
            .saturating_sub(TTL_SAFETY_MARGIN)
            .max(MIN_TOKEN_TTL)
    }

    /// Stores a token under both its client key and its token-id key.
    ///
    /// Both writes are attempted in order; if either fails the operation
    /// reports failure but nothing is rolled back. A stale single-keyed
    /// entry simply expires.
    pub async fn put_token(&self, token: &Token) -> bool {
        let Ok(value) = Self::encode(token) else {
            return false;
        };
        let ttl = self.token_entry_ttl(token);

        let by_client = self
            .bounded(
                "put_token",
                self.store
                    .put(&keys::token_by_client(&token.client_id), value.clone(), ttl),
            )
            .await;
        let by_id = self
            .bounded(
                "put_token",
                self.store
                    .put(&keys::token_by_id(&token.token_id), value, ttl),
            )
            .await;

        by_client.is_ok() && by_id.is_ok()
    }

    async fn get_token(&self, key: &str) -> Option<Token> {
        let value = self.bounded("get_token", self.store.get(key)).await.ok()??;
        let token: Token = Self::decode(value)?;

        if token.is_expired(Utc::now()) {
            // Stale entry that outlived its subject; drop both key forms.
            let _ = self
                .bounded(
                    "get_token",
                    self.store.delete(&keys::token_by_client(&token.client_id)),
                )
                .await;
            let _ = self
                .bounded(
                    "get_token",
                    self.store.delete(&keys::token_by_id(&token.token_id)),
                )
                .await;
            return None;
        }
        Some(token)
    }

    /// Live token for a client, if cached.
    pub async fn get_token_by_client(&self, client_id: &ClientId) -> Option<Token> {
        self.get_token(&keys::token_by_client(client_id)).await
    }

    /// Live token by token id, if cached.
    pub async fn get_token_by_id(&self, token_id: &TokenId) -> Option<Token> {
        self.get_token(&keys::token_by_id(token_id)).await
    }

    /// Removes both token key forms and the credential entry for a client.
    pub async fn invalidate_client(&self, client_id: &ClientId) {
        // Fetch first so the token-id key can be dropped too.
        if let Some(token) = self.get_token_by_client(client_id).await {
            let _ = self
                .bounded(
                    "invalidate_client",
                    self.store.delete(&keys::token_by_id(&token.token_id)),
                )
                .await;
        }
        let _ = self
            .bounded(
                "invalidate_client",
                self.store.delete(&keys::token_by_client(client_id)),
            )
            .await;
        let _ = self
            .bounded(
                "invalidate_client",
                self.store.delete(&keys::credential(client_id)),
            )
            .await;
    }

    /// Best-effort concurrent removal of token-id entries.
    pub async fn invalidate_tokens_batch(&self, token_ids: &[TokenId]) {
        let mut tasks = JoinSet::new();
        for token_id in token_ids {
            let store = Arc::clone(&self.store);
            let key = keys::token_by_id(token_id);
            let deadline = self.config.op_deadline();
            tasks.spawn(async move {
                let _ = tokio::time::timeout(deadline, store.delete(&key)).await;
            });
        }
        while tasks.join_next().await.is_some() {}
    }

    /// Caches a credential record under the credential TTL, clamped below
    /// the earliest usable credential expiry minus the safety margin.
    pub async fn put_credential_record(&self, record: &CredentialRecord) -> bool {
        let Ok(value) = Self::encode(record) else {
            return false;
        };

        let mut ttl = self.config.credential_ttl();
        if let Some(expiry) = record.earliest_usable_expiry(Utc::now()) {
            let remaining = (expiry - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            ttl = ttl.min(remaining.saturating_sub(TTL_SAFETY_MARGIN));
        }
        if ttl.is_zero() {
            return false;
        }

        self.bounded(
            "put_credential",
            self.store.put(&keys::credential(&record.client_id), value, ttl),
        )
        .await
        .is_ok()
    }

    /// Cached credential record for a client, if present and live.
    pub async fn get_credential_record(&self, client_id: &ClientId) -> Option<CredentialRecord> {
        let value = self
            .bounded("get_credential", self.store.get(&keys::credential(client_id)))
            .await
            .ok()??;
        Self::decode(value)
    }

    /// Drops a client's cached credential record.
    pub async fn invalidate_credential(&self, client_id: &ClientId) {
        let _ = self
            .bounded(
                "invalidate_credential",
                self.store.delete(&keys::credential(client_id)),
            )
            .await;
    }

    /// Writes a revocation marker that outlives the token it shadows.
    pub async fn put_revocation(&self, token_id: &TokenId, ttl: Duration) -> bool {
        self.bounded(
            "put_revocation",
            self.store
                .put(&keys::revoked(token_id), serde_json::Value::Bool(true), ttl),
        )
        .await
        .is_ok()
    }

    /// True when a durable revocation marker exists for this token id.
    pub async fn is_revoked(&self, token_id: &TokenId) -> bool {
        self.bounded("is_revoked", self.store.get(&keys::revoked(token_id)))
            .await
            .ok()
            .flatten()
            .is_some()
    }
}
