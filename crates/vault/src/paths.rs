//! Stable path layout for every stored document
//!
//! Consumers of the vault agree on these paths; nothing else in the
//! workspace builds one by hand.

use payguard_core::ClientId;

/// Prefix under which per-client credential records live
pub const CREDENTIALS_PREFIX: &str = "payment/api/credentials";

/// Document holding the token-signing key set
pub const SIGNING_KEYS: &str = "payment/api/keys/token-signing";

/// Prefix under which rotation records live
pub const ROTATION_PREFIX: &str = "rotation";

/// Prefix under which advisory lock records live
pub const LOCKS_PREFIX: &str = "locks";

/// Credential record path for one client.
pub fn credentials(client_id: &ClientId) -> String {
    format!("{CREDENTIALS_PREFIX}/{client_id}")
}

/// Rotation record path for one client.
pub fn rotation(client_id: &ClientId) -> String {
    format!("{ROTATION_PREFIX}/{client_id}")
}

/// Advisory lock path for a lock key.
pub fn lock(key: &str) -> String {
    format!("{LOCKS_PREFIX}/{key}")
}
