//! Bounded exponential backoff for transient failures
//!
//! Only errors the vault taxonomy marks retryable get another attempt:
//! transport failures and 5xx answers. `NotFound`, `Conflict`, and auth
//! failures return immediately. Cancellation aborts the backoff sleep.

use payguard_core::{RetryConfig, VaultError, VaultResult};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Backoff schedule derived from [`RetryConfig`]
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first try included
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Multiplier applied per attempt
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Builds the schedule from configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.count.max(1),
            initial_delay: config.initial_delay(),
            multiplier: config.multiplier,
        }
    }

    /// Delay before attempt `attempt + 1`, with ±10% jitter so retries from
    /// concurrent callers do not land in lockstep.
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        use rand::RngExt;

        let base_ms = self.initial_delay.as_millis() as f64;
        let backoff_ms = base_ms * self.multiplier.powi(attempt as i32);
        let jitter = rand::rng().random_range(0.9..=1.1);
        Duration::from_millis((backoff_ms * jitter) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Retries an async vault operation under the policy.
///
/// Returns the first non-retryable error unchanged; after the budget is
/// exhausted the last transient error is returned. A cancelled token turns
/// into `VaultError::Unavailable` without further attempts.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &'static str,
    cancel: &CancellationToken,
    mut call: F,
) -> VaultResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = VaultResult<T>>,
{
    let mut last_error = None;

    for attempt in 0..policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(VaultError::Unavailable {
                reason: format!("{operation} cancelled"),
            });
        }

        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "transient vault failure"
                );
                last_error = Some(e);

                if attempt + 1 < policy.max_attempts {
                    let backoff = policy.backoff_duration(attempt);
                    debug!(operation, backoff_ms = backoff.as_millis() as u64, "backing off");
                    tokio::select! {
                        () = sleep(backoff) => {}
                        () = cancel.cancelled() => {
                            return Err(VaultError::Unavailable {
                                reason: format!("{operation} cancelled during backoff"),
                            });
                        }
                    }
                }
            }
        }
    }

    Err(last_error.unwrap_or(VaultError::Unavailable {
        reason: format!("{operation} exhausted retries"),
    }))
}
