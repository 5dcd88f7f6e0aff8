//! Process-wide revocation set
//!
//! Inserts are monotonic: once a token id lands in the set it never leaves
//! (the id simply stops mattering when the token's TTL passes). A
//! `revoked:<id>` cache marker written alongside gives at-least-once
//! durability across restarts; lookups repopulate the in-process set from
//! the marker.

use dashmap::DashSet;
use payguard_cache::CacheLayer;
use payguard_core::TokenId;
use std::time::Duration;
use tracing::debug;

/// Monotonic revocation set with cache-backed durability
pub struct RevocationSet {
    ids: DashSet<String>,
    cache: CacheLayer,
    default_marker_ttl: Duration,
}

impl RevocationSet {
    /// Creates an empty set writing markers through the given cache.
    ///
    /// `default_marker_ttl` bounds marker lifetime when the revoked token's
    /// remaining lifetime is unknown.
    pub fn new(cache: CacheLayer, default_marker_ttl: Duration) -> Self {
        Self {
            ids: DashSet::new(),
            cache,
            default_marker_ttl,
        }
    }

    /// Adds a token id to the set.
    ///
    /// Duplicate inserts are no-ops. Returns `true` when the id was newly
    /// revoked. The cache marker lives for the token's remaining lifetime
    /// when known, the default otherwise; marker write failure degrades to
    /// process-local revocation.
    pub async fn revoke(&self, token_id: &TokenId, remaining_lifetime: Option<Duration>) -> bool {
        let newly_inserted = self.ids.insert(token_id.to_string());
        if !newly_inserted {
            return false;
        }

        let ttl = remaining_lifetime.unwrap_or(self.default_marker_ttl);
        if !ttl.is_zero() && !self.cache.put_revocation(token_id, ttl).await {
            debug!(token_id = %token_id, "revocation marker write failed; revocation is process-local");
        }
        true
    }

    /// True when the id was revoked here or a durable marker exists.
    pub async fn is_revoked(&self, token_id: &TokenId) -> bool {
        if self.ids.contains(token_id.as_str()) {
            return true;
        }
        if self.cache.is_revoked(token_id).await {
            // Marker left by a previous process; adopt it.
            self.ids.insert(token_id.to_string());
            return true;
        }
        false
    }

    /// Number of ids revoked in this process.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when nothing has been revoked in this process.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payguard_cache::MemoryCache;
    use payguard_core::CacheConfig;
    use std::sync::Arc;

    fn set() -> (RevocationSet, Arc<MemoryCache>) {
        let store = Arc::new(MemoryCache::new());
        let cache = CacheLayer::new(Arc::clone(&store) as Arc<dyn payguard_cache::CacheStore>, CacheConfig::default());
        (RevocationSet::new(cache, Duration::from_secs(3600)), store)
    }

    #[tokio::test]
    async fn revocation_is_monotonic_and_idempotent() {
        let (set, _store) = set();
        let id = TokenId::generate();

        assert!(!set.is_revoked(&id).await);
        assert!(set.revoke(&id, None).await);
        assert!(!set.revoke(&id, None).await);
        assert!(set.is_revoked(&id).await);
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn marker_survives_a_new_process() {
        let (set, store) = set();
        let id = TokenId::generate();
        set.revoke(&id, Some(Duration::from_secs(60))).await;

        // Fresh set sharing the same backing store: the restart case.
        let cache = CacheLayer::new(Arc::clone(&store) as Arc<dyn payguard_cache::CacheStore>, CacheConfig::default());
        let restarted = RevocationSet::new(cache, Duration::from_secs(3600));
        assert!(restarted.is_revoked(&id).await);
        // Adopted into the in-process set.
        assert_eq!(restarted.len(), 1);
    }

    #[tokio::test]
    async fn cache_outage_keeps_revocation_process_local() {
        let (set, store) = set();
        let id = TokenId::generate();

        store.set_failing(true);
        assert!(set.revoke(&id, None).await);
        assert!(set.is_revoked(&id).await);
    }
}
