//! Payguard Rotation - zero-downtime credential rollover
//!
//! The controller walks each client through the dual-credential window:
//! a new secret is introduced alongside the old one, both authenticate
//! while vendors migrate, old-secret use gets flagged, and the old version
//! is retired once the windows elapse. All durable state lives in the
//! vault; transitions are serialized by a vault-backed advisory lock and
//! driven by a fixed-interval tick.
#![forbid(unsafe_code)]

/// The rotation state machine
pub mod controller;
/// Tick loop driving unattended advancement
pub mod driver;
/// Transition events and their sinks
pub mod events;

pub use crate::controller::{RotationController, StartedRotation};
pub use crate::driver::run_tick_loop;
pub use crate::events::{EventSink, MemoryEventSink, RotationEvent, TracingEventSink};
