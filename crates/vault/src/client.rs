//! Capability trait and versioned read/write types
//!
//! Every consumer (resolver, token engine, rotation controller) holds a
//! `Arc<dyn VaultClient>`; production wires [`crate::HttpVaultClient`],
//! tests wire [`crate::MemoryVault`].

use async_trait::async_trait;
use payguard_core::{ClientId, CredentialRecord, RotationRecord, SigningKeySet, VaultResult};
use std::sync::Arc;
use std::time::Duration;

/// A document together with the storage version CAS writes check against
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    /// The decoded document
    pub value: T,

    /// Monotonic storage version of the path
    pub version: u64,
}

impl<T> Versioned<T> {
    /// Pairs a document with its storage version.
    pub fn new(value: T, version: u64) -> Self {
        Self { value, version }
    }
}

/// Convenience alias for shared trait objects
pub type DynVaultClient = Arc<dyn VaultClient>;

/// Authenticated read/write access to the secret store
///
/// Writes to contended paths go through check-and-set: passing the version
/// from a prior read makes the write fail with `VaultError::Conflict` if
/// someone else wrote in between; passing `None` is a create-or-overwrite.
#[async_trait]
pub trait VaultClient: Send + Sync {
    /// Credential record at `payment/api/credentials/<client_id>`.
    async fn read_credentials(&self, client_id: &ClientId)
    -> VaultResult<Versioned<CredentialRecord>>;

    /// Writes a credential record, returning the new storage version.
    async fn write_credentials(
        &self,
        client_id: &ClientId,
        record: &CredentialRecord,
        cas: Option<u64>,
    ) -> VaultResult<u64>;

    /// Token-signing key set used for signature verification and issuance.
    async fn read_signing_keys(&self) -> VaultResult<SigningKeySet>;

    /// Installs a new token-signing key set.
    async fn write_signing_keys(&self, keys: &SigningKeySet) -> VaultResult<()>;

    /// Rotation record at `rotation/<client_id>`, absent when no rotation
    /// was ever recorded.
    async fn read_rotation(
        &self,
        client_id: &ClientId,
    ) -> VaultResult<Option<Versioned<RotationRecord>>>;

    /// Writes a rotation record, returning the new storage version.
    async fn write_rotation(
        &self,
        client_id: &ClientId,
        record: &RotationRecord,
        cas: Option<u64>,
    ) -> VaultResult<u64>;

    /// Removes a rotation record; removing an absent record succeeds.
    async fn delete_rotation(&self, client_id: &ClientId) -> VaultResult<()>;

    /// Clients with a rotation record on file.
    async fn list_rotations(&self) -> VaultResult<Vec<ClientId>>;

    /// Attempts to take the advisory lock `key` for `holder`.
    ///
    /// Returns `false` when another live holder owns it; expired holders
    /// are displaced.
    async fn try_lock(&self, key: &str, holder: &str, ttl: Duration) -> VaultResult<bool>;

    /// Releases an advisory lock if `holder` still owns it.
    async fn unlock(&self, key: &str, holder: &str) -> VaultResult<()>;

    /// Cheap liveness probe.
    async fn available(&self) -> bool;
}
