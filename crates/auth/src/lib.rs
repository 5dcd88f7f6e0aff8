//! Payguard Auth - credential resolution and the gateway entry point
//!
//! [`CredentialResolver`] answers "does this secret belong to this client"
//! with vault-backed truth, cache-backed degradation, and constant-time
//! failure paths. [`AuthService`] glues resolver, token engine, and cache
//! into the surface the outer HTTP handlers call.
#![forbid(unsafe_code)]

/// Vault-with-cache credential lookup and validation
pub mod resolver;
/// The gateway entry point
pub mod service;
/// Per-client in-flight deduplication
mod singleflight;

pub use crate::resolver::CredentialResolver;
pub use crate::service::AuthService;
