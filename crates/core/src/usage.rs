//! Per-version authentication counters
//!
//! The credential resolver records which version matched each successful
//! authentication; the rotation controller snapshots those counters into
//! the persisted [`crate::rotation::RotationStats`] and resets them when a
//! rotation finishes. Counters are process-local atomics; persistence
//! happens only through rotation record writes.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::id::ClientId;
use crate::rotation::RotationStats;

#[derive(Debug, Default)]
struct VersionCounters {
    auth_count: AtomicU64,
    deprecated_count: AtomicU64,
}

/// Registry of authentication counters keyed by (client, version)
#[derive(Debug, Default)]
pub struct UsageCounters {
    counters: DashMap<(ClientId, String), Arc<VersionCounters>>,
}

impl UsageCounters {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, client_id: &ClientId, version: &str) -> Arc<VersionCounters> {
        self.counters
            .entry((client_id.clone(), version.to_string()))
            .or_default()
            .clone()
    }

    /// Records a successful authentication with the given version.
    pub fn record_auth(&self, client_id: &ClientId, version: &str) {
        self.entry(client_id, version)
            .auth_count
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful authentication with a deprecated version.
    ///
    /// Increments both the plain counter and the deprecation counter.
    pub fn record_deprecated_auth(&self, client_id: &ClientId, version: &str) {
        let counters = self.entry(client_id, version);
        counters.auth_count.fetch_add(1, Ordering::Relaxed);
        counters.deprecated_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Successful authentications recorded for one version.
    pub fn auth_count(&self, client_id: &ClientId, version: &str) -> u64 {
        self.counters
            .get(&(client_id.clone(), version.to_string()))
            .map_or(0, |c| c.auth_count.load(Ordering::Relaxed))
    }

    /// Deprecated-use authentications recorded for one version.
    pub fn deprecated_count(&self, client_id: &ClientId, version: &str) -> u64 {
        self.counters
            .get(&(client_id.clone(), version.to_string()))
            .map_or(0, |c| c.deprecated_count.load(Ordering::Relaxed))
    }

    /// Snapshot of the counters relevant to one rotation.
    pub fn snapshot(
        &self,
        client_id: &ClientId,
        old_version: &str,
        new_version: &str,
    ) -> RotationStats {
        RotationStats {
            old_auth_count: self.auth_count(client_id, old_version),
            new_auth_count: self.auth_count(client_id, new_version),
            old_deprecated_count: self.deprecated_count(client_id, old_version),
        }
    }

    /// Drops all counters for a client (called when a rotation terminates).
    pub fn reset(&self, client_id: &ClientId) {
        self.counters.retain(|(id, _), _| id != client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ClientId {
        ClientId::new("acme").unwrap()
    }

    #[test]
    fn counts_accumulate_per_version() {
        let counters = UsageCounters::new();
        counters.record_auth(&client(), "v1");
        counters.record_auth(&client(), "v1");
        counters.record_auth(&client(), "v2");

        assert_eq!(counters.auth_count(&client(), "v1"), 2);
        assert_eq!(counters.auth_count(&client(), "v2"), 1);
        assert_eq!(counters.auth_count(&client(), "v3"), 0);
    }

    #[test]
    fn deprecated_auth_bumps_both_counters() {
        let counters = UsageCounters::new();
        counters.record_deprecated_auth(&client(), "v1");

        let stats = counters.snapshot(&client(), "v1", "v2");
        assert_eq!(stats.old_auth_count, 1);
        assert_eq!(stats.old_deprecated_count, 1);
        assert_eq!(stats.new_auth_count, 0);
    }

    #[test]
    fn reset_only_touches_the_given_client() {
        let counters = UsageCounters::new();
        let other = ClientId::new("other").unwrap();
        counters.record_auth(&client(), "v1");
        counters.record_auth(&other, "v1");

        counters.reset(&client());

        assert_eq!(counters.auth_count(&client(), "v1"), 0);
        assert_eq!(counters.auth_count(&other, "v1"), 1);
    }
}
