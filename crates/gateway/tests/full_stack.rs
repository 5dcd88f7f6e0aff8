//! The whole core assembled from configuration, driven through a
//! provision → authenticate → rotate → migrate → retire cycle.

use chrono::Utc;
use payguard_cache::MemoryCache;
use payguard_core::{ClientId, GatewayConfig, RotationPhase, telemetry};
use payguard_gateway::Gateway;
use payguard_rotation::MemoryEventSink;
use payguard_vault::{DynVaultClient, MemoryVault, VaultClient};
use std::sync::Arc;

struct Fixture {
    gateway: Gateway,
    vault: Arc<MemoryVault>,
    events: Arc<MemoryEventSink>,
}

fn acme() -> ClientId {
    ClientId::new("acme").unwrap()
}

async fn fixture() -> Fixture {
    telemetry::init();

    let vault = Arc::new(MemoryVault::new());
    let events = Arc::new(MemoryEventSink::new());
    let gateway = Gateway::bootstrap(
        GatewayConfig::default(),
        Arc::clone(&vault) as DynVaultClient,
        Arc::new(MemoryCache::new()),
        Arc::clone(&events) as Arc<dyn payguard_rotation::EventSink>,
    )
    .await
    .unwrap();

    Fixture {
        gateway,
        vault,
        events,
    }
}

#[tokio::test]
async fn bootstrap_seeds_signing_keys_once() {
    let f = fixture().await;
    let seeded = f.vault.read_signing_keys().await.unwrap();
    assert_eq!(seeded.current.kid, "boot");

    // A second core over the same vault reuses the stored keys, so tokens
    // issued by the first instance verify on the second.
    let secret = f
        .gateway
        .controller
        .provision_client(&acme())
        .await
        .unwrap();
    let token = f
        .gateway
        .service
        .authenticate("acme", secret.expose())
        .await
        .unwrap();

    let peer = Gateway::bootstrap(
        GatewayConfig::default(),
        Arc::clone(&f.vault) as DynVaultClient,
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryEventSink::new()),
    )
    .await
    .unwrap();
    assert!(peer.service.validate_token(&token.token_string).await);
}

#[tokio::test]
async fn provision_authenticate_rotate_and_retire() {
    let f = fixture().await;

    // Provision and authenticate with the first secret.
    let first_secret = f
        .gateway
        .controller
        .provision_client(&acme())
        .await
        .unwrap();
    let token = f
        .gateway
        .service
        .authenticate("acme", first_secret.expose())
        .await
        .unwrap();
    assert!(f.gateway.service.validate_token(&token.token_string).await);

    // Start a rotation; both secrets now authenticate.
    let started = f
        .gateway
        .controller
        .start_rotation(&acme(), "quarterly")
        .await
        .unwrap();
    let second_secret = started.new_secret.expose().to_string();

    f.gateway.service.revoke_client("acme").await.unwrap();
    let with_old = f
        .gateway
        .service
        .authenticate("acme", first_secret.expose())
        .await
        .unwrap();
    assert!(with_old.client_id == acme());

    f.gateway.service.revoke_client("acme").await.unwrap();
    let with_new = f
        .gateway
        .service
        .authenticate("acme", &second_secret)
        .await
        .unwrap();
    assert!(f.gateway.service.validate_token(&with_new.token_string).await);

    // Walk the rotation to completion (deadlines forced via the vault).
    for expected in [
        RotationPhase::OldDeprecated,
        RotationPhase::Retired,
        RotationPhase::Completed,
    ] {
        if expected != RotationPhase::Completed {
            let versioned = f.vault.read_rotation(&acme()).await.unwrap().unwrap();
            let mut record = versioned.value;
            record.transition_deadline = Utc::now() - chrono::Duration::seconds(1);
            f.vault
                .write_rotation(&acme(), &record, Some(versioned.version))
                .await
                .unwrap();
        }
        let record = f.gateway.controller.advance(&acme()).await.unwrap();
        assert_eq!(record.state, expected);
    }

    // Only the new secret survives retirement.
    f.gateway.service.revoke_client("acme").await.unwrap();
    assert!(
        f.gateway
            .service
            .authenticate("acme", first_secret.expose())
            .await
            .is_err()
    );
    assert!(
        f.gateway
            .service
            .authenticate("acme", &second_secret)
            .await
            .is_ok()
    );

    // Full transition trail was emitted.
    assert_eq!(f.events.events().len(), 5);

    f.gateway.shutdown();
}
