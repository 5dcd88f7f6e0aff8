//! Backend capability trait
//!
//! Implementations are swappable: production uses [`crate::MemoryCache`]
//! (or any remote store adapted to this trait), tests inject failing
//! doubles to exercise degradation paths.

use async_trait::async_trait;
use payguard_core::CacheResult;
use std::time::Duration;

/// TTL'd key-value store over namespaced string keys and JSON values
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetches a live entry; expired entries count as absent.
    async fn get(&self, key: &str) -> CacheResult<Option<serde_json::Value>>;

    /// Stores an entry that expires after `ttl`.
    async fn put(&self, key: &str, value: serde_json::Value, ttl: Duration) -> CacheResult<()>;

    /// Removes an entry; removing an absent key succeeds.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Drops every entry.
    async fn clear(&self) -> CacheResult<()>;
}
