//! In-process vault with CAS semantics and outage injection
//!
//! Backs tests and local runs. Semantics mirror the HTTP implementation:
//! versioned documents, check-and-set conflicts, advisory locks with
//! stealable expiry. `set_available(false)` simulates a full outage;
//! per-operation counters let tests assert how often the authoritative
//! store was actually consulted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use payguard_core::{
    ClientId, CredentialRecord, RotationRecord, SigningKeySet, VaultError, VaultResult,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::client::{VaultClient, Versioned};
use crate::paths;

#[derive(Debug, Clone)]
struct Document {
    value: serde_json::Value,
    version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
    holder: String,
    expires_at: DateTime<Utc>,
}

/// In-process [`VaultClient`] implementation
#[derive(Debug, Default)]
pub struct MemoryVault {
    documents: DashMap<String, Document>,
    available: AtomicBool,
    credential_reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryVault {
    /// Creates an empty, available vault.
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
            available: AtomicBool::new(true),
            credential_reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Toggles simulated availability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of credential record reads served (cache-miss visibility).
    pub fn credential_read_count(&self) -> u64 {
        self.credential_reads.load(Ordering::SeqCst)
    }

    /// Number of successful writes of any kind.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> VaultResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VaultError::Unavailable {
                reason: "simulated outage".into(),
            })
        }
    }

    fn read_document<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> VaultResult<Versioned<T>> {
        let doc = self
            .documents
            .get(path)
            .ok_or_else(|| VaultError::NotFound {
                path: path.to_string(),
            })?;
        let value = serde_json::from_value(doc.value.clone()).map_err(|e| VaultError::Malformed {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Versioned::new(value, doc.version))
    }

    fn write_document<T: Serialize>(
        &self,
        path: &str,
        value: &T,
        cas: Option<u64>,
    ) -> VaultResult<u64> {
        let encoded = serde_json::to_value(value).map_err(|e| VaultError::Malformed {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        use dashmap::mapref::entry::Entry;

        let new_version = match self.documents.entry(path.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get().version;
                if cas.is_some_and(|expected| expected != current) {
                    return Err(VaultError::Conflict {
                        path: path.to_string(),
                    });
                }
                let next = current + 1;
                occupied.insert(Document {
                    value: encoded,
                    version: next,
                });
                next
            }
            Entry::Vacant(vacant) => {
                // CAS against an absent document only succeeds for "create".
                if cas.is_some_and(|expected| expected != 0) {
                    return Err(VaultError::Conflict {
                        path: path.to_string(),
                    });
                }
                vacant.insert(Document {
                    value: encoded,
                    version: 1,
                });
                1
            }
        };

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(new_version)
    }
}

#[async_trait]
impl VaultClient for MemoryVault {
    async fn read_credentials(
        &self,
        client_id: &ClientId,
    ) -> VaultResult<Versioned<CredentialRecord>> {
        self.check_available()?;
        self.credential_reads.fetch_add(1, Ordering::SeqCst);
        self.read_document(&paths::credentials(client_id))
    }

    async fn write_credentials(
        &self,
        client_id: &ClientId,
        record: &CredentialRecord,
        cas: Option<u64>,
    ) -> VaultResult<u64> {
        self.check_available()?;
        self.write_document(&paths::credentials(client_id), record, cas)
    }

    async fn read_signing_keys(&self) -> VaultResult<SigningKeySet> {
        self.check_available()?;
        Ok(self.read_document::<SigningKeySet>(paths::SIGNING_KEYS)?.value)
    }

    async fn write_signing_keys(&self, keys: &SigningKeySet) -> VaultResult<()> {
        self.check_available()?;
        self.write_document(paths::SIGNING_KEYS, keys, None)?;
        Ok(())
    }

    async fn read_rotation(
        &self,
        client_id: &ClientId,
    ) -> VaultResult<Option<Versioned<RotationRecord>>> {
        self.check_available()?;
        match self.read_document(&paths::rotation(client_id)) {
            Ok(versioned) => Ok(Some(versioned)),
            Err(VaultError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write_rotation(
        &self,
        client_id: &ClientId,
        record: &RotationRecord,
        cas: Option<u64>,
    ) -> VaultResult<u64> {
        self.check_available()?;
        self.write_document(&paths::rotation(client_id), record, cas)
    }

    async fn delete_rotation(&self, client_id: &ClientId) -> VaultResult<()> {
        self.check_available()?;
        self.documents.remove(&paths::rotation(client_id));
        Ok(())
    }

    async fn list_rotations(&self) -> VaultResult<Vec<ClientId>> {
        self.check_available()?;
        let prefix = format!("{}/", paths::ROTATION_PREFIX);
        let mut ids = Vec::new();
        for entry in &self.documents {
            if let Some(raw) = entry.key().strip_prefix(&prefix)
                && let Ok(id) = ClientId::new(raw)
            {
                ids.push(id);
            }
        }
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    async fn try_lock(&self, key: &str, holder: &str, ttl: Duration) -> VaultResult<bool> {
        self.check_available()?;
        let path = paths::lock(key);
        let now = Utc::now();
        let record = LockRecord {
            holder: holder.to_string(),
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(30)),
        };

        loop {
            match self.read_document::<LockRecord>(&path) {
                Ok(existing) => {
                    let live = existing.value.expires_at > now && existing.value.holder != holder;
                    if live {
                        return Ok(false);
                    }
                    // Expired or re-entrant: take over with CAS to beat racers.
                    match self.write_document(&path, &record, Some(existing.version)) {
                        Ok(_) => return Ok(true),
                        Err(VaultError::Conflict { .. }) => continue,
                        Err(e) => return Err(e),
                    }
                }
                Err(VaultError::NotFound { .. }) => {
                    match self.write_document(&path, &record, Some(0)) {
                        Ok(_) => return Ok(true),
                        Err(VaultError::Conflict { .. }) => continue,
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn unlock(&self, key: &str, holder: &str) -> VaultResult<()> {
        self.check_available()?;
        let path = paths::lock(key);
        if let Ok(existing) = self.read_document::<LockRecord>(&path)
            && existing.value.holder == holder
        {
            self.documents.remove(&path);
        }
        Ok(())
    }

    async fn available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payguard_core::{Credential, RotationState, SecretString, SigningKeyMaterial, secret};

    fn client() -> ClientId {
        ClientId::new("acme").unwrap()
    }

    fn record() -> CredentialRecord {
        let hash = secret::hash_secret(&SecretString::new("s3cret")).unwrap();
        CredentialRecord::with_credential(Credential::new(
            client(),
            hash,
            "v1",
            RotationState::Normal,
        ))
    }

    #[tokio::test]
    async fn read_write_round_trip_with_versions() {
        let vault = MemoryVault::new();
        let v1 = vault.write_credentials(&client(), &record(), None).await.unwrap();
        assert_eq!(v1, 1);

        let read = vault.read_credentials(&client()).await.unwrap();
        assert_eq!(read.version, 1);
        assert_eq!(read.value.credentials.len(), 1);

        let v2 = vault
            .write_credentials(&client(), &read.value, Some(read.version))
            .await
            .unwrap();
        assert_eq!(v2, 2);
    }

    #[tokio::test]
    async fn stale_cas_write_conflicts() {
        let vault = MemoryVault::new();
        vault.write_credentials(&client(), &record(), None).await.unwrap();
        vault.write_credentials(&client(), &record(), None).await.unwrap();

        let err = vault
            .write_credentials(&client(), &record(), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Conflict { .. }));
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let vault = MemoryVault::new();
        let err = vault.read_credentials(&client()).await.unwrap_err();
        assert!(matches!(err, VaultError::NotFound { .. }));
    }

    #[tokio::test]
    async fn outage_makes_every_call_unavailable() {
        let vault = MemoryVault::new();
        vault.write_credentials(&client(), &record(), None).await.unwrap();

        vault.set_available(false);
        assert!(!vault.available().await);
        assert!(matches!(
            vault.read_credentials(&client()).await,
            Err(VaultError::Unavailable { .. })
        ));

        vault.set_available(true);
        assert!(vault.read_credentials(&client()).await.is_ok());
    }

    #[tokio::test]
    async fn signing_keys_round_trip() {
        let vault = MemoryVault::new();
        assert!(matches!(
            vault.read_signing_keys().await,
            Err(VaultError::NotFound { .. })
        ));

        let set = SigningKeySet::single(SigningKeyMaterial::generate("k1"));
        vault.write_signing_keys(&set).await.unwrap();
        assert_eq!(vault.read_signing_keys().await.unwrap().current.kid, "k1");
    }

    #[tokio::test]
    async fn rotation_records_listable_and_deletable() {
        let vault = MemoryVault::new();
        assert!(vault.read_rotation(&client()).await.unwrap().is_none());

        let record = RotationRecord::new(client(), "v1", "v2", "scheduled", Utc::now());
        vault.write_rotation(&client(), &record, None).await.unwrap();

        assert_eq!(vault.list_rotations().await.unwrap(), vec![client()]);
        assert!(vault.read_rotation(&client()).await.unwrap().is_some());

        vault.delete_rotation(&client()).await.unwrap();
        assert!(vault.read_rotation(&client()).await.unwrap().is_none());
        assert!(vault.list_rotations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn locks_exclude_live_holders_and_steal_expired_ones() {
        let vault = MemoryVault::new();
        let ttl = Duration::from_secs(30);

        assert!(vault.try_lock("rotation/acme", "ctl-1", ttl).await.unwrap());
        assert!(!vault.try_lock("rotation/acme", "ctl-2", ttl).await.unwrap());
        // Re-entrant for the same holder.
        assert!(vault.try_lock("rotation/acme", "ctl-1", ttl).await.unwrap());

        // Expired lock is stolen.
        assert!(
            vault
                .try_lock("rotation/other", "ctl-1", Duration::ZERO)
                .await
                .unwrap()
        );
        assert!(vault.try_lock("rotation/other", "ctl-2", ttl).await.unwrap());

        // Unlock by a non-holder is a no-op.
        vault.unlock("rotation/acme", "ctl-2").await.unwrap();
        assert!(!vault.try_lock("rotation/acme", "ctl-2", ttl).await.unwrap());
        vault.unlock("rotation/acme", "ctl-1").await.unwrap();
        assert!(vault.try_lock("rotation/acme", "ctl-2", ttl).await.unwrap());
    }
}
