//! Tick loop driving unattended advancement
//!
//! A fixed-interval loop with ±10% jitter walks every active rotation and
//! lets the controller decide whether a deadline has passed. Failures are
//! logged and retried on the next tick; cancellation stops the loop
//! between ticks.

use payguard_core::RotationError;
use rand::RngExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::RotationController;

/// Runs the controller's tick loop until `shutdown` fires.
pub async fn run_tick_loop(
    controller: Arc<RotationController>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!(interval_secs = interval.as_secs(), "rotation tick loop started");

    loop {
        tokio::select! {
            () = tokio::time::sleep(jittered(interval)) => {
                tick(&controller).await;
            }
            () = shutdown.cancelled() => {
                info!("rotation tick loop shutting down");
                return;
            }
        }
    }
}

async fn tick(controller: &RotationController) {
    let clients = match controller.active_clients().await {
        Ok(clients) => clients,
        Err(e) => {
            warn!(error = %e, "tick could not list rotations; retrying next tick");
            return;
        }
    };

    for client_id in clients {
        match controller.advance(&client_id).await {
            Ok(record) => {
                debug!(client_id = %client_id, state = %record.state, "tick advanced");
            }
            // Another controller owns this client right now; its tick will
            // handle it.
            Err(RotationError::LockHeld { .. }) => {}
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "advance failed; retrying next tick");
            }
        }
    }
}

/// Interval ±10%, so controller replicas drift apart instead of stampeding
/// the vault together.
fn jittered(interval: Duration) -> Duration {
    let millis = interval.as_millis() as f64;
    let factor = rand::rng().random_range(0.9..=1.1);
    Duration::from_millis((millis * factor) as u64)
}
