//! Payguard Core - shared data model for the authentication gateway
//!
//! Everything the component crates agree on lives here: validated
//! identifiers, the credential and token data model, the rotation record,
//! the error taxonomy, configuration, and the in-process usage counters
//! that feed rotation statistics.
#![forbid(unsafe_code)]

/// Gateway configuration (token, cache, vault, rotation, auth sections)
pub mod config;
/// Credential data model and the per-client credential record
pub mod credential;
/// Error taxonomy shared across all component crates
pub mod error;
/// Validated identifier newtypes
pub mod id;
/// Signing key material stored in the vault
pub mod keys;
/// Rotation record, phases, and statistics
pub mod rotation;
/// Zeroizing secret wrapper and salted-hash helpers
pub mod secret;
/// Tracing subscriber bootstrap
pub mod telemetry;
/// Bearer token data model
pub mod token;
/// Per-version authentication counters
pub mod usage;

// ── Root re-exports ─────────────────────────────────────────────────────────
// Commonly-used types available directly as `payguard_core::TypeName`.

pub use crate::config::{
    AuthConfig, CacheConfig, ConfigError, GatewayConfig, RetryConfig, RotationConfig, TokenConfig,
    VaultConfig,
};
pub use crate::credential::{Credential, CredentialRecord, RotationState};
pub use crate::error::{
    CacheError, CacheResult, GatewayError, GatewayResult, RotationError, RotationResult,
    TokenError, TokenResult, ValidationError, VaultError, VaultResult,
};
pub use crate::id::{ClientId, TokenId};
pub use crate::keys::{SigningKeyMaterial, SigningKeySet};
pub use crate::rotation::{RotationPhase, RotationRecord, RotationStats};
pub use crate::secret::SecretString;
pub use crate::token::{DEFAULT_PERMISSIONS, Token};
pub use crate::usage::UsageCounters;
