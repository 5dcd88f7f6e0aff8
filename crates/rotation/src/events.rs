//! Transition events and their sinks
//!
//! Every state-machine transition emits exactly one [`RotationEvent`] to
//! the configured sink. These are observability events, not alerts:
//! thresholds and routing live with the external monitoring collaborator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use payguard_core::{ClientId, RotationResult};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One state-machine transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationEvent {
    /// Client whose rotation moved
    pub client_id: ClientId,

    /// State the rotation left
    pub from: String,

    /// State the rotation entered
    pub to: String,

    /// When the transition happened
    pub at: DateTime<Utc>,

    /// Version being phased out
    pub old_version: String,

    /// Version being phased in
    pub new_version: String,
}

impl RotationEvent {
    /// Builds an event stamped with the current time.
    pub fn now(
        client_id: ClientId,
        from: impl Into<String>,
        to: impl Into<String>,
        old_version: impl Into<String>,
        new_version: impl Into<String>,
    ) -> Self {
        Self {
            client_id,
            from: from.into(),
            to: to.into(),
            at: Utc::now(),
            old_version: old_version.into(),
            new_version: new_version.into(),
        }
    }
}

/// Where transition events go
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers one event. Delivery failure never blocks a transition; the
    /// controller logs and moves on.
    async fn emit(&self, event: &RotationEvent) -> RotationResult<()>;
}

/// Production sink: structured log line per transition
#[derive(Debug, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: &RotationEvent) -> RotationResult<()> {
        info!(
            client_id = %event.client_id,
            from = %event.from,
            to = %event.to,
            old_version = %event.old_version,
            new_version = %event.new_version,
            "rotation transition"
        );
        Ok(())
    }
}

/// Test sink collecting every event in order
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<RotationEvent>>,
}

impl MemoryEventSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far, in emission order.
    pub fn events(&self) -> Vec<RotationEvent> {
        self.events.lock().clone()
    }

    /// `(from, to)` pairs in emission order.
    pub fn transitions(&self) -> Vec<(String, String)> {
        self.events
            .lock()
            .iter()
            .map(|e| (e.from.clone(), e.to.clone()))
            .collect()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn emit(&self, event: &RotationEvent) -> RotationResult<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
