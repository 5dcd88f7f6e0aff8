//! Payguard Vault - authoritative secret store client
//!
//! The vault owns credential records, rotation metadata, the token-signing
//! key set, and the advisory locks the rotation controller takes. This
//! crate defines the capability trait the rest of the gateway programs
//! against, an HTTP implementation with bounded retries and lazy
//! re-authentication, and an in-process implementation for tests and local
//! runs.
#![forbid(unsafe_code)]

/// Capability trait and versioned read/write types
pub mod client;
/// Advisory lock guard over the vault lock primitives
pub mod lock;
/// In-process vault with CAS semantics and outage injection
pub mod memory;
/// Stable path layout for every stored document
pub mod paths;
/// Bounded exponential backoff for transient failures
pub mod retry;

/// HTTP implementation
pub mod http;

pub use crate::client::{DynVaultClient, VaultClient, Versioned};
pub use crate::http::HttpVaultClient;
pub use crate::lock::VaultLockGuard;
pub use crate::memory::MemoryVault;
pub use crate::retry::{RetryPolicy, retry_with_backoff};
