//! Payguard Gateway - top-level assembly
//!
//! Wires the component crates into one running core, leaves first: cache
//! and vault client, then resolver and token engine, then the auth service
//! and rotation controller on top. The outer HTTP handlers hold a
//! [`Gateway`] and call through it; nothing here is ambient or global.
#![forbid(unsafe_code)]

use payguard_auth::{AuthService, CredentialResolver};
use payguard_cache::{CacheLayer, CacheStore};
use payguard_core::{
    GatewayConfig, GatewayError, GatewayResult, SigningKeyMaterial, SigningKeySet, UsageCounters,
    VaultError,
};
use payguard_rotation::{EventSink, RotationController, run_tick_loop};
use payguard_token::{SigningKeys, TokenEngine};
use payguard_vault::DynVaultClient;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The assembled authentication gateway core
pub struct Gateway {
    /// Entry point for the outer HTTP handlers
    pub service: Arc<AuthService>,

    /// Entry point for rotation operators
    pub controller: Arc<RotationController>,

    /// Token engine (signing-key installation, metrics)
    pub engine: Arc<TokenEngine>,

    /// Credential resolver (shared usage counters included)
    pub resolver: Arc<CredentialResolver>,

    /// Typed cache surface
    pub cache: CacheLayer,

    config: GatewayConfig,
    shutdown: CancellationToken,
}

impl Gateway {
    /// Builds the core from configuration and the two backends.
    ///
    /// Reads the token-signing key set off the vault; on the very first
    /// boot (no key set stored yet) fresh material is generated and
    /// written back, so a cold environment comes up signed.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidInput` on a rejected configuration and
    /// `VaultUnavailable` when the signing keys cannot be read or seeded.
    pub async fn bootstrap(
        config: GatewayConfig,
        vault: DynVaultClient,
        store: Arc<dyn CacheStore>,
        events: Arc<dyn EventSink>,
    ) -> GatewayResult<Self> {
        config
            .validate()
            .map_err(|e| GatewayError::InvalidInput(e.to_string()))?;

        let cache = CacheLayer::new(store, config.cache.clone());

        let key_set = match vault.read_signing_keys().await {
            Ok(key_set) => key_set,
            Err(VaultError::NotFound { .. }) => {
                let key_set = SigningKeySet::single(SigningKeyMaterial::generate("boot"));
                vault.write_signing_keys(&key_set).await.map_err(GatewayError::from)?;
                info!("no signing keys on file; generated and stored an initial set");
                key_set
            }
            Err(e) => return Err(e.into()),
        };
        let keys = SigningKeys::from_key_set(key_set);

        let usage = Arc::new(UsageCounters::new());
        let resolver = Arc::new(CredentialResolver::new(
            Arc::clone(&vault),
            cache.clone(),
            Arc::clone(&usage),
        ));
        let engine = Arc::new(TokenEngine::new(config.token.clone(), keys, cache.clone()));

        let shutdown = CancellationToken::new();
        let service = Arc::new(
            AuthService::new(
                Arc::clone(&resolver),
                Arc::clone(&engine),
                cache.clone(),
                config.auth.clone(),
            )
            .with_cancellation(shutdown.clone()),
        );

        let controller = Arc::new(RotationController::new(
            vault,
            cache.clone(),
            usage,
            events,
            config.rotation.clone(),
        ));

        info!(
            issuer = %config.token.issuer,
            audience = %config.token.audience,
            "gateway core assembled"
        );
        Ok(Self {
            service,
            controller,
            engine,
            resolver,
            cache,
            config,
            shutdown,
        })
    }

    /// Spawns the rotation tick loop; it stops when [`Gateway::shutdown`]
    /// is called.
    pub fn spawn_rotation_driver(&self) -> JoinHandle<()> {
        tokio::spawn(run_tick_loop(
            Arc::clone(&self.controller),
            self.config.rotation.check_interval(),
            self.shutdown.clone(),
        ))
    }

    /// The shutdown token shared by the service and background drivers.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Fails in-flight entry points closed and stops background drivers.
    pub fn shutdown(&self) {
        info!("gateway shutting down");
        self.shutdown.cancel();
    }
}
