//! End-to-end authentication flows over in-process backends.

use payguard_auth::{AuthService, CredentialResolver};
use payguard_cache::{CacheLayer, CacheStore, MemoryCache};
use payguard_core::credential::RotationState;
use payguard_core::secret::hash_secret;
use payguard_core::{
    AuthConfig, CacheConfig, ClientId, Credential, CredentialRecord, GatewayError, SecretString,
    SigningKeyMaterial, SigningKeySet, TokenConfig, UsageCounters,
};
use payguard_token::{SigningKeys, TokenEngine};
use payguard_vault::{DynVaultClient, MemoryVault, VaultClient};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    service: Arc<AuthService>,
    vault: Arc<MemoryVault>,
    store: Arc<MemoryCache>,
}

fn acme() -> ClientId {
    ClientId::new("acme").unwrap()
}

async fn fixture() -> Fixture {
    fixture_with(TokenConfig::default(), AuthConfig::default(), |v| v).await
}

async fn fixture_with(
    token_config: TokenConfig,
    auth_config: AuthConfig,
    wrap_vault: impl FnOnce(DynVaultClient) -> DynVaultClient,
) -> Fixture {
    let vault = Arc::new(MemoryVault::new());
    let hash = hash_secret(&SecretString::new("s3cret")).unwrap();
    let record = CredentialRecord::with_credential(Credential::new(
        acme(),
        hash,
        "v1",
        RotationState::Normal,
    ));
    vault.write_credentials(&acme(), &record, None).await.unwrap();

    let store = Arc::new(MemoryCache::new());
    let backend: Arc<dyn CacheStore> = Arc::clone(&store) as Arc<dyn CacheStore>;
    let cache = CacheLayer::new(backend, CacheConfig::default());

    let vault_client: DynVaultClient = Arc::clone(&vault) as DynVaultClient;
    let vault_client = wrap_vault(vault_client);
    let resolver = Arc::new(CredentialResolver::new(
        vault_client,
        cache.clone(),
        Arc::new(UsageCounters::new()),
    ));

    let keys =
        SigningKeys::from_key_set(SigningKeySet::single(SigningKeyMaterial::generate("k1")));
    let engine = Arc::new(TokenEngine::new(token_config, keys, cache.clone()));

    let service = Arc::new(AuthService::new(resolver, engine, cache, auth_config));
    Fixture {
        service,
        vault,
        store,
    }
}

#[tokio::test]
async fn happy_path_issues_and_then_reuses_a_token() {
    let f = fixture().await;

    let token = f.service.authenticate("acme", "s3cret").await.unwrap();
    assert_eq!(token.client_id, acme());
    assert_eq!(
        token.permissions,
        vec!["process_payment".to_string(), "view_status".to_string()]
    );

    let lifetime = token.expires_at - token.issued_at;
    assert_eq!(lifetime.num_seconds(), 3600);

    // A prompt re-authentication observes the same token.
    let again = f.service.authenticate("acme", "s3cret").await.unwrap();
    assert_eq!(again.token_id, token.token_id);

    // One vault read covered both calls.
    assert_eq!(f.vault.credential_read_count(), 1);
}

#[tokio::test]
async fn invalid_secret_is_rejected_without_side_effects() {
    let f = fixture().await;
    let writes_before = f.vault.write_count();

    let err = f.service.authenticate("acme", "wrong").await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidCredentials));
    assert_eq!(err.http_status(), 401);

    // No token cached, no vault write.
    let cached = f.store.get("token:acme").await.unwrap();
    assert!(cached.is_none());
    assert_eq!(f.vault.write_count(), writes_before);
}

#[tokio::test]
async fn unknown_client_and_wrong_secret_are_indistinguishable() {
    let f = fixture().await;

    let wrong_secret = f.service.authenticate("acme", "wrong").await.unwrap_err();
    let unknown_client = f.service.authenticate("ghost", "wrong").await.unwrap_err();

    assert!(matches!(wrong_secret, GatewayError::InvalidCredentials));
    assert!(matches!(unknown_client, GatewayError::InvalidCredentials));

    // Work-factor padding keeps the two failure paths in the same timing
    // envelope. Proportional bound to stay robust on loaded CI hosts.
    let start = std::time::Instant::now();
    let _ = f.service.authenticate("acme", "wrong").await;
    let known = start.elapsed();

    let start = std::time::Instant::now();
    let _ = f.service.authenticate("ghost", "wrong").await;
    let unknown = start.elapsed();

    let diff = known.abs_diff(unknown);
    let max = known.max(unknown);
    assert!(
        diff.as_secs_f64() / max.as_secs_f64() < 0.5,
        "timing variance too large: {known:?} vs {unknown:?}"
    );
}

#[tokio::test]
async fn blank_input_is_rejected_before_any_backend_call() {
    let f = fixture().await;

    assert!(matches!(
        f.service.authenticate("", "s3cret").await.unwrap_err(),
        GatewayError::InvalidInput(_)
    ));
    assert!(matches!(
        f.service.authenticate("acme", "   ").await.unwrap_err(),
        GatewayError::InvalidInput(_)
    ));
    assert_eq!(f.vault.credential_read_count(), 0);
}

#[tokio::test]
async fn vault_outage_with_warm_cache_still_authenticates() {
    let f = fixture().await;

    // Warm the credential cache.
    let first = f.service.authenticate("acme", "s3cret").await.unwrap();

    // Drop only the token entries so the next call must re-issue.
    f.store.delete("token:acme").await.unwrap();
    f.store
        .delete(&format!("token_id:{}", first.token_id))
        .await
        .unwrap();

    f.vault.set_available(false);

    let during_outage = f.service.authenticate("acme", "s3cret").await.unwrap();
    assert_ne!(during_outage.token_id, first.token_id);
    assert!(f.service.validate_token(&during_outage.token_string).await);

    // Cold cache during the same outage: fail closed with 503.
    CacheStore::clear(&*f.store).await.unwrap();
    let err = f.service.authenticate("acme", "s3cret").await.unwrap_err();
    assert!(matches!(err, GatewayError::VaultUnavailable));
    assert_eq!(err.http_status(), 503);
}

#[tokio::test]
async fn refresh_of_an_expired_token_rotates_it() {
    let f = fixture_with(
        TokenConfig {
            ttl_seconds: 1,
            ..TokenConfig::default()
        },
        AuthConfig::default(),
        |v| v,
    )
    .await;

    let token = f.service.authenticate("acme", "s3cret").await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert!(!f.service.validate_token(&token.token_string).await);

    let refreshed = f.service.refresh(&token.token_string).await.unwrap();
    assert_ne!(refreshed.token_id, token.token_id);
    assert!(f.service.validate_token(&refreshed.token_string).await);
    // The original id is revoked, not merely expired.
    assert!(!f.service.validate_token(&token.token_string).await);
}

#[tokio::test]
async fn refresh_of_a_live_token_is_identity() {
    let f = fixture().await;
    let token = f.service.authenticate("acme", "s3cret").await.unwrap();

    let refreshed = f.service.refresh(&token.token_string).await.unwrap();
    assert_eq!(refreshed.token_id, token.token_id);
    assert_eq!(refreshed.token_string, token.token_string);
}

#[tokio::test]
async fn refresh_of_garbage_is_unauthenticated() {
    let f = fixture().await;
    let err = f.service.refresh("garbage").await.unwrap_err();
    assert!(matches!(err, GatewayError::Unauthenticated));
}

#[tokio::test]
async fn revoke_client_kills_the_held_token_and_reauth_works() {
    let f = fixture().await;
    let token = f.service.authenticate("acme", "s3cret").await.unwrap();

    assert!(f.service.revoke_client("acme").await.unwrap());
    assert!(!f.service.validate_token(&token.token_string).await);

    let fresh = f.service.authenticate("acme", "s3cret").await.unwrap();
    assert_ne!(fresh.token_id, token.token_id);
    assert!(f.service.validate_token(&fresh.token_string).await);

    // Nothing held anymore: revoke reports false.
    f.service.revoke_client("acme").await.unwrap();
    let _ = f.service.authenticate("acme", "s3cret").await.unwrap();
    assert!(f.service.revoke_client("acme").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_authentications_share_one_vault_read_and_one_token() {
    let f = fixture().await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&f.service);
        tasks.push(tokio::spawn(async move {
            service.authenticate("acme", "s3cret").await.unwrap()
        }));
    }

    let mut token_ids = Vec::new();
    for task in tasks {
        token_ids.push(task.await.unwrap().token_id);
    }

    let first = token_ids[0].clone();
    assert!(token_ids.iter().all(|id| *id == first));
    assert_eq!(f.vault.credential_read_count(), 1);
}

#[tokio::test]
async fn token_status_reports_remaining_life_until_revocation() {
    let f = fixture().await;

    assert_eq!(f.service.token_status("unknown-id").await, None);
    assert_eq!(f.service.token_status("").await, None);

    let token = f.service.authenticate("acme", "s3cret").await.unwrap();
    let remaining = f
        .service
        .token_status(token.token_id.as_str())
        .await
        .expect("live token");
    assert!(remaining > 3_500 && remaining <= 3_600);

    f.service.revoke_client("acme").await.unwrap();
    assert_eq!(f.service.token_status(token.token_id.as_str()).await, None);
}

#[tokio::test]
async fn header_authentication_mirrors_the_direct_path() {
    let f = fixture().await;

    let mut headers = HashMap::new();
    headers.insert("X-Client-ID".to_string(), "acme".to_string());
    headers.insert("X-Client-Secret".to_string(), "s3cret".to_string());
    let token = f.service.authenticate_headers(&headers).await.unwrap();
    assert_eq!(token.client_id, acme());

    let mut missing = HashMap::new();
    missing.insert("X-Client-ID".to_string(), "acme".to_string());
    assert!(matches!(
        f.service.authenticate_headers(&missing).await.unwrap_err(),
        GatewayError::MissingCredentials
    ));

    let mut blank = HashMap::new();
    blank.insert("X-Client-ID".to_string(), "  ".to_string());
    blank.insert("X-Client-Secret".to_string(), "s3cret".to_string());
    assert!(matches!(
        f.service.authenticate_headers(&blank).await.unwrap_err(),
        GatewayError::MissingCredentials
    ));
}

#[tokio::test]
async fn slow_vault_fails_closed_with_timeout() {
    struct SlowVault(DynVaultClient);

    #[async_trait::async_trait]
    impl VaultClient for SlowVault {
        async fn read_credentials(
            &self,
            client_id: &ClientId,
        ) -> payguard_core::VaultResult<payguard_vault::Versioned<CredentialRecord>> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            self.0.read_credentials(client_id).await
        }

        async fn write_credentials(
            &self,
            client_id: &ClientId,
            record: &CredentialRecord,
            cas: Option<u64>,
        ) -> payguard_core::VaultResult<u64> {
            self.0.write_credentials(client_id, record, cas).await
        }

        async fn read_signing_keys(
            &self,
        ) -> payguard_core::VaultResult<payguard_core::SigningKeySet> {
            self.0.read_signing_keys().await
        }

        async fn write_signing_keys(
            &self,
            keys: &payguard_core::SigningKeySet,
        ) -> payguard_core::VaultResult<()> {
            self.0.write_signing_keys(keys).await
        }

        async fn read_rotation(
            &self,
            client_id: &ClientId,
        ) -> payguard_core::VaultResult<Option<payguard_vault::Versioned<payguard_core::RotationRecord>>>
        {
            self.0.read_rotation(client_id).await
        }

        async fn write_rotation(
            &self,
            client_id: &ClientId,
            record: &payguard_core::RotationRecord,
            cas: Option<u64>,
        ) -> payguard_core::VaultResult<u64> {
            self.0.write_rotation(client_id, record, cas).await
        }

        async fn delete_rotation(&self, client_id: &ClientId) -> payguard_core::VaultResult<()> {
            self.0.delete_rotation(client_id).await
        }

        async fn list_rotations(&self) -> payguard_core::VaultResult<Vec<ClientId>> {
            self.0.list_rotations().await
        }

        async fn try_lock(
            &self,
            key: &str,
            holder: &str,
            ttl: Duration,
        ) -> payguard_core::VaultResult<bool> {
            self.0.try_lock(key, holder, ttl).await
        }

        async fn unlock(&self, key: &str, holder: &str) -> payguard_core::VaultResult<()> {
            self.0.unlock(key, holder).await
        }

        async fn available(&self) -> bool {
            self.0.available().await
        }
    }

    let f = fixture_with(
        TokenConfig::default(),
        AuthConfig {
            request_deadline_ms: 100,
        },
        |inner| Arc::new(SlowVault(inner)) as DynVaultClient,
    )
    .await;

    let err = f.service.authenticate("acme", "s3cret").await.unwrap_err();
    assert!(matches!(err, GatewayError::Timeout { .. }));
    assert_eq!(err.http_status(), 504);
}
