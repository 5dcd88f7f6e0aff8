//! Advisory lock guard over the vault lock primitives
//!
//! The rotation controller serializes per-client transitions through these
//! locks. Acquisition is non-blocking: contention is surfaced to the caller
//! instead of waited out, because the next tick will try again anyway.

use payguard_core::VaultResult;
use std::time::Duration;
use tracing::warn;

use crate::client::DynVaultClient;

/// Held advisory lock; release it explicitly when the critical section ends
#[must_use = "an unreleased lock blocks other holders until its TTL expires"]
pub struct VaultLockGuard {
    client: DynVaultClient,
    key: String,
    holder: String,
    released: bool,
}

impl VaultLockGuard {
    /// Tries to take `key` for `holder`; `None` when a live holder owns it.
    pub async fn try_acquire(
        client: DynVaultClient,
        key: impl Into<String>,
        holder: impl Into<String>,
        ttl: Duration,
    ) -> VaultResult<Option<Self>> {
        let key = key.into();
        let holder = holder.into();

        if client.try_lock(&key, &holder, ttl).await? {
            Ok(Some(Self {
                client,
                key,
                holder,
                released: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// Releases the lock.
    ///
    /// Failures are logged, not propagated: the TTL bounds how long a
    /// failed release can block the next holder.
    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = self.client.unlock(&self.key, &self.holder).await {
            warn!(key = %self.key, error = %e, "failed to release advisory lock; TTL will expire it");
        }
    }
}

impl Drop for VaultLockGuard {
    fn drop(&mut self) {
        if !self.released {
            // Dropped without release (early return / panic unwind). The
            // lock record's TTL is the backstop.
            warn!(key = %self.key, "advisory lock guard dropped without release");
        }
    }
}
