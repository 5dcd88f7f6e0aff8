//! Vault-with-cache credential lookup and validation
//!
//! Lookups are cache-aside: cache hit wins, miss goes to the vault and
//! populates the cache. Validation compares the presented secret against
//! every usable credential version (both of them during a rotation) and
//! pads the work so unknown clients, wrong secrets, and inactive
//! credentials are indistinguishable by timing.

use chrono::Utc;
use payguard_cache::CacheLayer;
use payguard_core::credential::RotationState;
use payguard_core::secret::{dummy_verify, verify_secret};
use payguard_core::{
    ClientId, CredentialRecord, SecretString, UsageCounters, VaultError, VaultResult,
};
use payguard_vault::DynVaultClient;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maximum credential versions a client can present at once (the rotating
/// pair); validation always burns this many verification work units.
const MAX_ACTIVE_VERSIONS: usize = 2;

/// Cache-aware credential lookup and secret validation
pub struct CredentialResolver {
    vault: DynVaultClient,
    cache: CacheLayer,
    usage: Arc<UsageCounters>,
}

impl CredentialResolver {
    /// Wires the resolver from its collaborators.
    pub fn new(vault: DynVaultClient, cache: CacheLayer, usage: Arc<UsageCounters>) -> Self {
        Self {
            vault,
            cache,
            usage,
        }
    }

    /// Counters shared with the rotation controller.
    pub fn usage(&self) -> Arc<UsageCounters> {
        Arc::clone(&self.usage)
    }

    /// Credential record for a client: cache first, vault on miss,
    /// cache populated on the way out.
    pub async fn resolve(&self, client_id: &ClientId) -> VaultResult<CredentialRecord> {
        if let Some(record) = self.cache.get_credential_record(client_id).await {
            debug!(client_id = %client_id, "credential cache hit");
            return Ok(record);
        }

        let record = self.vault.read_credentials(client_id).await?.value;
        self.cache.put_credential_record(&record).await;
        Ok(record)
    }

    /// Like [`CredentialResolver::resolve`], but a vault outage is served
    /// from the cache when a locally-unexpired record is present.
    ///
    /// Returns `Ok(None)` for an unknown client; the outage error only
    /// surfaces when the cache cannot cover for the vault either.
    pub async fn resolve_with_fallback(
        &self,
        client_id: &ClientId,
    ) -> VaultResult<Option<CredentialRecord>> {
        if let Some(record) = self.cache.get_credential_record(client_id).await {
            return Ok(Some(record));
        }

        match self.vault.read_credentials(client_id).await {
            Ok(versioned) => {
                self.cache.put_credential_record(&versioned.value).await;
                Ok(Some(versioned.value))
            }
            Err(VaultError::NotFound { .. }) => Ok(None),
            Err(e) if e.is_retryable() => {
                // The cache read above already missed; there is no fallback.
                warn!(client_id = %client_id, error = %e, "vault outage with cold cache");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Validates a presented secret against the client's stored versions.
    ///
    /// Vault errors propagate; unknown clients and mismatches are `false`.
    pub async fn validate(&self, client_id: &ClientId, secret: &SecretString) -> VaultResult<bool> {
        if secret.is_blank() {
            return Ok(false);
        }

        match self.resolve(client_id).await {
            Ok(record) => Ok(self.verify_against_record(client_id, secret, &record)),
            Err(VaultError::NotFound { .. }) => {
                burn_work_units(secret, MAX_ACTIVE_VERSIONS);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Like [`CredentialResolver::validate`], but vault outages fall back
    /// to the cached record.
    pub async fn validate_with_fallback(
        &self,
        client_id: &ClientId,
        secret: &SecretString,
    ) -> VaultResult<bool> {
        if secret.is_blank() {
            return Ok(false);
        }

        match self.resolve_with_fallback(client_id).await? {
            Some(record) => Ok(self.verify_against_record(client_id, secret, &record)),
            None => {
                burn_work_units(secret, MAX_ACTIVE_VERSIONS);
                Ok(false)
            }
        }
    }

    /// Compares the secret against every usable version, then records which
    /// version matched. The loop never exits early and always burns
    /// [`MAX_ACTIVE_VERSIONS`] work units in total.
    fn verify_against_record(
        &self,
        client_id: &ClientId,
        secret: &SecretString,
        record: &CredentialRecord,
    ) -> bool {
        let now = Utc::now();
        let candidates: Vec<_> = record.usable(now).take(MAX_ACTIVE_VERSIONS).collect();

        let mut matched: Option<(&str, RotationState)> = None;
        for candidate in &candidates {
            let ok = verify_secret(secret, &candidate.hashed_secret);
            if ok && matched.is_none() {
                matched = Some((candidate.version.as_str(), candidate.rotation_state));
            }
        }
        burn_work_units(secret, MAX_ACTIVE_VERSIONS - candidates.len());

        match matched {
            Some((version, RotationState::OldDeprecated)) => {
                warn!(
                    client_id = %client_id,
                    version,
                    "authentication with deprecated credential version"
                );
                self.usage.record_deprecated_auth(client_id, version);
                true
            }
            Some((version, _)) => {
                self.usage.record_auth(client_id, version);
                true
            }
            None => false,
        }
    }
}

fn burn_work_units(secret: &SecretString, count: usize) {
    for _ in 0..count {
        dummy_verify(secret);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payguard_cache::{CacheLayer, MemoryCache};
    use payguard_core::secret::hash_secret;
    use payguard_core::{CacheConfig, Credential};
    use payguard_vault::{MemoryVault, VaultClient};

    struct Fixture {
        resolver: CredentialResolver,
        vault: Arc<MemoryVault>,
        store: Arc<MemoryCache>,
    }

    fn acme() -> ClientId {
        ClientId::new("acme").unwrap()
    }

    async fn fixture_with(record: CredentialRecord) -> Fixture {
        let vault = Arc::new(MemoryVault::new());
        vault
            .write_credentials(&record.client_id, &record, None)
            .await
            .unwrap();

        let store = Arc::new(MemoryCache::new());
        let cache = CacheLayer::new(
            Arc::clone(&store) as Arc<dyn payguard_cache::CacheStore>,
            CacheConfig::default(),
        );
        let vault_client: DynVaultClient = Arc::clone(&vault) as DynVaultClient;
        let resolver =
            CredentialResolver::new(vault_client, cache, Arc::new(UsageCounters::new()));
        Fixture {
            resolver,
            vault,
            store,
        }
    }

    fn single_version_record(secret: &str) -> CredentialRecord {
        let hash = hash_secret(&SecretString::new(secret)).unwrap();
        CredentialRecord::with_credential(Credential::new(
            acme(),
            hash,
            "v1",
            RotationState::Normal,
        ))
    }

    #[tokio::test]
    async fn resolve_populates_the_cache() {
        let f = fixture_with(single_version_record("s3cret")).await;

        assert!(f.resolver.resolve(&acme()).await.is_ok());
        assert_eq!(f.vault.credential_read_count(), 1);

        // Second resolve is served from cache.
        assert!(f.resolver.resolve(&acme()).await.is_ok());
        assert_eq!(f.vault.credential_read_count(), 1);
    }

    #[tokio::test]
    async fn validate_accepts_the_right_secret_only() {
        let f = fixture_with(single_version_record("s3cret")).await;

        assert!(
            f.resolver
                .validate(&acme(), &SecretString::new("s3cret"))
                .await
                .unwrap()
        );
        assert!(
            !f.resolver
                .validate(&acme(), &SecretString::new("wrong"))
                .await
                .unwrap()
        );
        assert!(
            !f.resolver
                .validate(&acme(), &SecretString::new("  "))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn blank_secret_never_reaches_the_vault() {
        let f = fixture_with(single_version_record("s3cret")).await;
        assert!(
            !f.resolver
                .validate(&acme(), &SecretString::new(""))
                .await
                .unwrap()
        );
        assert_eq!(f.vault.credential_read_count(), 0);
    }

    #[tokio::test]
    async fn unknown_client_is_a_mismatch_not_an_error() {
        let f = fixture_with(single_version_record("s3cret")).await;
        let ghost = ClientId::new("ghost").unwrap();
        assert!(
            !f.resolver
                .validate(&ghost, &SecretString::new("s3cret"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn inactive_and_expired_credentials_deny() {
        let mut record = single_version_record("s3cret");
        record.credentials[0].active = false;
        let f = fixture_with(record).await;
        assert!(
            !f.resolver
                .validate(&acme(), &SecretString::new("s3cret"))
                .await
                .unwrap()
        );

        let mut record = single_version_record("s3cret");
        record.credentials[0].expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        let f = fixture_with(record).await;
        assert!(
            !f.resolver
                .validate(&acme(), &SecretString::new("s3cret"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn both_rotating_versions_validate_and_are_counted() {
        let mut record = single_version_record("s3cret");
        record.credentials[0].rotation_state = RotationState::OldDeprecated;
        let new_hash = hash_secret(&SecretString::new("s3cret2")).unwrap();
        record
            .insert(Credential::new(acme(), new_hash, "v2", RotationState::DualActive))
            .unwrap();
        let f = fixture_with(record).await;

        assert!(
            f.resolver
                .validate(&acme(), &SecretString::new("s3cret"))
                .await
                .unwrap()
        );
        assert!(
            f.resolver
                .validate(&acme(), &SecretString::new("s3cret2"))
                .await
                .unwrap()
        );

        let usage = f.resolver.usage();
        assert_eq!(usage.auth_count(&acme(), "v1"), 1);
        assert_eq!(usage.deprecated_count(&acme(), "v1"), 1);
        assert_eq!(usage.auth_count(&acme(), "v2"), 1);
        assert_eq!(usage.deprecated_count(&acme(), "v2"), 0);
    }

    #[tokio::test]
    async fn outage_with_warm_cache_falls_back() {
        let f = fixture_with(single_version_record("s3cret")).await;

        // Warm the cache.
        assert!(
            f.resolver
                .validate_with_fallback(&acme(), &SecretString::new("s3cret"))
                .await
                .unwrap()
        );

        f.vault.set_available(false);
        assert!(
            f.resolver
                .validate_with_fallback(&acme(), &SecretString::new("s3cret"))
                .await
                .unwrap()
        );
        // Once the cache goes cold the outage is no longer maskable.
        payguard_cache::CacheStore::clear(&*f.store).await.unwrap();
        assert!(matches!(
            f.resolver
                .validate_with_fallback(&acme(), &SecretString::new("s3cret"))
                .await,
            Err(VaultError::Unavailable { .. })
        ));
    }
}
