//! Payguard Token - signed bearer token engine
//!
//! Issues, validates, parses, renews, and revokes the HS256 JWS tokens
//! internal services carry instead of vendor credentials. The engine holds
//! the process-wide signing key pair (copy-on-write, lock-free reads) and
//! the revocation set (monotonic inserts, cache-backed durability).
#![forbid(unsafe_code)]

/// JWS claims layout
pub mod claims;
/// Issue / validate / parse / renew / revoke
pub mod engine;
/// Current + previous signing key pair
pub mod keys;
/// Process-wide revocation set
pub mod revocation;

pub use crate::claims::Claims;
pub use crate::engine::{TokenEngine, TokenMetrics};
pub use crate::keys::SigningKeys;
pub use crate::revocation::RevocationSet;
