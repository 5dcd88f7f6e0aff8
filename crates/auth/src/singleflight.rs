//! Per-client in-flight deduplication
//!
//! At most one authenticate/renew/revoke proceeds per client id; everyone
//! else queues on the same mutex and re-checks the cache once they get in,
//! observing the winner's token instead of redoing vault work. There is no
//! global lock; contention is strictly per client.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use payguard_core::ClientId;

#[derive(Default)]
pub(crate) struct SingleFlight {
    inflight: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SingleFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Waits for the client's slot. The returned guard serializes all
    /// holders of the same client id.
    pub(crate) async fn acquire(&self, client_id: &ClientId) -> FlightGuard {
        let slot = self
            .inflight
            .entry(client_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = slot.lock_owned().await;
        FlightGuard {
            inflight: Arc::clone(&self.inflight),
            key: client_id.to_string(),
            guard: Some(guard),
        }
    }
}

pub(crate) struct FlightGuard {
    inflight: Arc<DashMap<String, Arc<Mutex<()>>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // A single strong count means only the map itself still holds the
        // slot: no waiter, no holder, so it can go. remove_if serializes
        // against concurrent entry() calls on the same shard.
        self.inflight
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}
