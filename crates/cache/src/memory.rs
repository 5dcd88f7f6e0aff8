//! In-process backend
//!
//! A `DashMap` of entries carrying their expiry instant. Eviction is lazy:
//! an expired entry is dropped by the read that finds it. Hit/miss counters
//! feed [`CacheStats`] for operational visibility.

use async_trait::async_trait;
use dashmap::DashMap;
use payguard_core::{CacheError, CacheResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::store::CacheStore;

#[derive(Debug, Clone)]
struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// In-process TTL'd cache backend
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    hits: AtomicU64,
    misses: AtomicU64,
    failing: AtomicBool,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail (outage injection for tests).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Current hit/miss/size counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.entries.len() as u64,
        }
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::Backend("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<serde_json::Value>> {
        self.check_available()?;

        let now = Instant::now();
        let (live, expired) = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => (Some(entry.value.clone()), false),
            Some(_) => (None, true),
            None => (None, false),
        };
        // The read guard is gone here; eviction takes the write lock safely.
        if expired {
            self.entries.remove(key);
        }

        if live.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(live)
    }

    async fn put(&self, key: &str, value: serde_json::Value, ttl: Duration) -> CacheResult<()> {
        self.check_available()?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.check_available()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> CacheResult<()> {
        self.check_available()?;
        self.entries.clear();
        Ok(())
    }
}

/// Hit/miss/size counters for one backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads that found a live entry
    pub hits: u64,

    /// Reads that found nothing (or only an expired entry)
    pub misses: u64,

    /// Entries currently held, expired stragglers included
    pub size: u64,
}

impl CacheStats {
    /// Hit rate in `[0.0, 1.0]`; zero before any traffic.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
