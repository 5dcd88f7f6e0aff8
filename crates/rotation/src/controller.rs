//! The rotation state machine
//!
//! ```text
//!  NORMAL ──start──▶ INITIATED ──vault-write(new)──▶ DUAL_ACTIVE
//!                                                       │
//!                                  transition_period  ──▶ OLD_DEPRECATED
//!                                                       │
//!                                     grace elapsed   ──▶ RETIRED → NORMAL
//! ```
//!
//! Each transition runs under the per-client advisory lock and lands in the
//! vault with check-and-set, so a controller crash never leaves a torn
//! record. `advance` is idempotent: it computes the next legal state from
//! timestamps and does nothing when no deadline has passed. A vault outage
//! fails the current attempt without regressing state; the next tick
//! retries.

use chrono::{Duration as ChronoDuration, Utc};
use payguard_cache::CacheLayer;
use payguard_core::credential::RotationState;
use payguard_core::secret::hash_secret;
use payguard_core::{
    ClientId, Credential, RotationConfig, RotationError, RotationPhase, RotationRecord,
    RotationResult, SecretString, UsageCounters, VaultError,
};
use payguard_vault::{DynVaultClient, VaultLockGuard, Versioned, paths};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::events::{EventSink, RotationEvent};

/// Outcome of starting a rotation
///
/// The plaintext secret appears here exactly once; the vault only ever
/// stores its hash. Operators hand it to the vendor out of band.
#[derive(Debug)]
pub struct StartedRotation {
    /// The durable record, already in DUAL_ACTIVE
    pub record: RotationRecord,

    /// The freshly generated secret for the new version
    pub new_secret: SecretString,
}

/// Orchestrates credential rollover for all clients
pub struct RotationController {
    vault: DynVaultClient,
    cache: CacheLayer,
    usage: Arc<UsageCounters>,
    events: Arc<dyn EventSink>,
    config: RotationConfig,
    holder: String,
}

impl RotationController {
    /// Wires the controller from its collaborators.
    ///
    /// `usage` must be the same registry the credential resolver records
    /// into, otherwise rotation statistics stay at zero.
    pub fn new(
        vault: DynVaultClient,
        cache: CacheLayer,
        usage: Arc<UsageCounters>,
        events: Arc<dyn EventSink>,
        config: RotationConfig,
    ) -> Self {
        Self {
            vault,
            cache,
            usage,
            events,
            config,
            holder: format!("rotation-controller-{}", Uuid::new_v4()),
        }
    }

    /// Provisions a client's first credential version.
    ///
    /// Creates `v1` in NORMAL state and returns the one-time plaintext
    /// secret. Fails with `AlreadyProvisioned` when any credential record
    /// exists for the client.
    #[instrument(skip(self), fields(client_id = %client_id))]
    pub async fn provision_client(&self, client_id: &ClientId) -> RotationResult<SecretString> {
        match self.vault.read_credentials(client_id).await {
            Ok(_) => Err(RotationError::AlreadyProvisioned {
                client_id: client_id.to_string(),
            }),
            Err(VaultError::NotFound { .. }) => {
                let secret = SecretString::generate();
                let hashed = hash_secret(&secret)?;
                let record = payguard_core::CredentialRecord::with_credential(Credential::new(
                    client_id.clone(),
                    hashed,
                    "v1",
                    RotationState::Normal,
                ));
                // CAS on "absent" so two racing provisioners cannot both win.
                self.vault
                    .write_credentials(client_id, &record, Some(0))
                    .await?;
                info!(client_id = %client_id, "client provisioned");
                Ok(secret)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Begins a rotation for a client.
    ///
    /// Generates and stores the new credential version, moves the record
    /// through INITIATED into DUAL_ACTIVE, and returns the one-time
    /// plaintext secret. Fails with `AlreadyInProgress` when a rotation is
    /// active and `LockHeld` when another controller owns the client.
    #[instrument(skip(self), fields(client_id = %client_id))]
    pub async fn start_rotation(
        &self,
        client_id: &ClientId,
        reason: &str,
    ) -> RotationResult<StartedRotation> {
        let lock = self.lock(client_id).await?;
        let outcome = self.start_rotation_locked(client_id, reason).await;
        lock.release().await;
        outcome
    }

    async fn start_rotation_locked(
        &self,
        client_id: &ClientId,
        reason: &str,
    ) -> RotationResult<StartedRotation> {
        let existing = self.vault.read_rotation(client_id).await?;
        if existing.as_ref().is_some_and(|r| r.value.is_active()) {
            return Err(RotationError::AlreadyInProgress {
                client_id: client_id.to_string(),
            });
        }
        let record_cas = existing.map_or(0, |r| r.version);

        let credentials = match self.vault.read_credentials(client_id).await {
            Ok(versioned) => versioned,
            Err(VaultError::NotFound { .. }) => {
                return Err(RotationError::UnknownClient {
                    client_id: client_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let old_version = credentials
            .value
            .normal_credential()
            .map(|c| c.version.clone())
            .ok_or_else(|| RotationError::IllegalTransition {
                client_id: client_id.to_string(),
                from: "no NORMAL credential".to_string(),
            })?;
        let new_version = credentials.value.next_version();

        let new_secret = SecretString::generate();
        let hashed = hash_secret(&new_secret)?;

        // INITIATED is durable before the new credential exists, so a crash
        // here is recoverable by the next advance (which aborts).
        let mut record = RotationRecord::new(
            client_id.clone(),
            old_version.clone(),
            new_version.clone(),
            reason,
            Utc::now() + chrono_period(self.config.transition_period()),
        );
        let record_version = self
            .vault
            .write_rotation(client_id, &record, Some(record_cas))
            .await?;
        self.emit(&record, "NORMAL", "INITIATED").await;

        // vault-write(new): both versions go DUAL_ACTIVE in one CAS write.
        let mut updated = credentials.value.clone();
        updated.insert(Credential::new(
            client_id.clone(),
            hashed,
            new_version.clone(),
            RotationState::DualActive,
        ))?;
        updated.set_state(&old_version, RotationState::DualActive)?;

        if let Err(e) = self
            .vault
            .write_credentials(client_id, &updated, Some(credentials.version))
            .await
        {
            warn!(client_id = %client_id, error = %e, "credential write failed, aborting rotation");
            record.state = RotationPhase::Aborted;
            record.completed_at = Some(Utc::now());
            if let Err(abort_err) = self
                .vault
                .write_rotation(client_id, &record, Some(record_version))
                .await
            {
                warn!(client_id = %client_id, error = %abort_err, "abort record write failed");
            }
            self.emit(&record, "INITIATED", "ABORTED").await;
            return Err(e.into());
        }

        record.state = RotationPhase::DualActive;
        record.transition_deadline = Utc::now() + chrono_period(self.config.transition_period());
        self.vault
            .write_rotation(client_id, &record, Some(record_version))
            .await?;
        self.emit(&record, "INITIATED", "DUAL_ACTIVE").await;

        // Resolver must see the pair on its next miss.
        self.cache.invalidate_credential(client_id).await;

        info!(
            client_id = %client_id,
            old_version = %record.old_version,
            new_version = %record.new_version,
            "rotation started"
        );
        Ok(StartedRotation {
            record,
            new_secret,
        })
    }

    /// Advances a rotation one legal step, if its deadline has passed.
    ///
    /// Idempotent; calling it early or on a finished rotation changes
    /// nothing. This is also the operator-facing immediate-advance RPC.
    #[instrument(skip(self), fields(client_id = %client_id))]
    pub async fn advance(&self, client_id: &ClientId) -> RotationResult<RotationRecord> {
        let lock = self.lock(client_id).await?;
        let outcome = self.advance_locked(client_id).await;
        lock.release().await;
        outcome
    }

    async fn advance_locked(&self, client_id: &ClientId) -> RotationResult<RotationRecord> {
        let versioned =
            self.vault
                .read_rotation(client_id)
                .await?
                .ok_or_else(|| RotationError::NotFound {
                    client_id: client_id.to_string(),
                })?;
        let mut record = versioned.value;
        let record_cas = versioned.version;

        if !record.is_active() {
            return Ok(record);
        }

        let now = Utc::now();
        match record.state {
            RotationPhase::Initiated => {
                // A crash between the rotation write and the credential
                // write leaves INITIATED behind. Recover from what the
                // credential record actually says.
                let credentials = self.vault.read_credentials(client_id).await?;
                if credentials.value.by_version(&record.new_version).is_some() {
                    record.state = RotationPhase::DualActive;
                    record.transition_deadline = now + chrono_period(self.config.transition_period());
                    self.vault
                        .write_rotation(client_id, &record, Some(record_cas))
                        .await?;
                    self.emit(&record, "INITIATED", "DUAL_ACTIVE").await;
                } else {
                    record.state = RotationPhase::Aborted;
                    record.completed_at = Some(now);
                    self.vault
                        .write_rotation(client_id, &record, Some(record_cas))
                        .await?;
                    self.emit(&record, "INITIATED", "ABORTED").await;
                }
            }
            RotationPhase::DualActive if now >= record.transition_deadline => {
                let credentials = self.vault.read_credentials(client_id).await?;
                let mut updated = credentials.value.clone();
                updated.set_state(&record.old_version, RotationState::OldDeprecated)?;
                self.vault
                    .write_credentials(client_id, &updated, Some(credentials.version))
                    .await?;

                record.state = RotationPhase::OldDeprecated;
                record.transition_deadline = now + chrono_period(self.config.deprecation_period());
                record.stats =
                    self.usage
                        .snapshot(client_id, &record.old_version, &record.new_version);
                self.vault
                    .write_rotation(client_id, &record, Some(record_cas))
                    .await?;
                self.emit(&record, "DUAL_ACTIVE", "OLD_DEPRECATED").await;
                self.cache.invalidate_credential(client_id).await;
            }
            RotationPhase::OldDeprecated if now >= record.transition_deadline => {
                let credentials = self.vault.read_credentials(client_id).await?;
                let mut updated = credentials.value.clone();
                updated.set_state(&record.old_version, RotationState::Retired)?;
                updated.set_state(&record.new_version, RotationState::Normal)?;
                self.vault
                    .write_credentials(client_id, &updated, Some(credentials.version))
                    .await?;

                record.state = RotationPhase::Retired;
                record.stats =
                    self.usage
                        .snapshot(client_id, &record.old_version, &record.new_version);
                self.vault
                    .write_rotation(client_id, &record, Some(record_cas))
                    .await?;
                self.emit(&record, "OLD_DEPRECATED", "RETIRED").await;
                self.cache.invalidate_credential(client_id).await;
            }
            RotationPhase::Retired => {
                record.state = RotationPhase::Completed;
                record.completed_at = Some(now);
                record.stats =
                    self.usage
                        .snapshot(client_id, &record.old_version, &record.new_version);
                self.vault
                    .write_rotation(client_id, &record, Some(record_cas))
                    .await?;
                self.emit(&record, "RETIRED", "NORMAL").await;
                self.usage.reset(client_id);
                info!(
                    client_id = %client_id,
                    new_version = %record.new_version,
                    "rotation completed"
                );
            }
            // Deadline not reached: nothing to do.
            RotationPhase::DualActive | RotationPhase::OldDeprecated => {}
            RotationPhase::Completed | RotationPhase::Aborted => {}
        }

        Ok(record)
    }

    /// Aborts a rotation; legal only from INITIATED or DUAL_ACTIVE.
    ///
    /// The new credential version is removed, the old one returns to
    /// NORMAL, and the record is closed.
    #[instrument(skip(self), fields(client_id = %client_id))]
    pub async fn abort(&self, client_id: &ClientId) -> RotationResult<RotationRecord> {
        let lock = self.lock(client_id).await?;
        let outcome = self.abort_locked(client_id).await;
        lock.release().await;
        outcome
    }

    async fn abort_locked(&self, client_id: &ClientId) -> RotationResult<RotationRecord> {
        let versioned =
            self.vault
                .read_rotation(client_id)
                .await?
                .ok_or_else(|| RotationError::NotFound {
                    client_id: client_id.to_string(),
                })?;
        let mut record = versioned.value;
        let record_cas = versioned.version;

        let from = record.state;
        if !matches!(from, RotationPhase::Initiated | RotationPhase::DualActive) {
            return Err(RotationError::IllegalTransition {
                client_id: client_id.to_string(),
                from: from.to_string(),
            });
        }

        let credentials = self.vault.read_credentials(client_id).await?;
        let mut updated = credentials.value.clone();
        updated.remove_version(&record.new_version);
        if updated.by_version(&record.old_version).is_some() {
            updated.set_state(&record.old_version, RotationState::Normal)?;
        }
        self.vault
            .write_credentials(client_id, &updated, Some(credentials.version))
            .await?;

        record.state = RotationPhase::Aborted;
        record.completed_at = Some(Utc::now());
        self.vault
            .write_rotation(client_id, &record, Some(record_cas))
            .await?;
        self.emit(&record, &from.to_string(), "ABORTED").await;
        self.usage.reset(client_id);
        self.cache.invalidate_credential(client_id).await;

        info!(client_id = %client_id, from = %from, "rotation aborted");
        Ok(record)
    }

    /// Current rotation record with live counters overlaid, if one exists.
    pub async fn status(&self, client_id: &ClientId) -> RotationResult<Option<RotationRecord>> {
        let Some(Versioned { value: mut record, .. }) =
            self.vault.read_rotation(client_id).await?
        else {
            return Ok(None);
        };

        if record.is_active() {
            record.stats =
                self.usage
                    .snapshot(client_id, &record.old_version, &record.new_version);
        }
        Ok(Some(record))
    }

    /// Clients with a rotation record on file (tick-loop work list).
    pub async fn active_clients(&self) -> RotationResult<Vec<ClientId>> {
        Ok(self.vault.list_rotations().await?)
    }

    async fn lock(&self, client_id: &ClientId) -> RotationResult<VaultLockGuard> {
        VaultLockGuard::try_acquire(
            Arc::clone(&self.vault),
            paths::rotation(client_id),
            self.holder.as_str(),
            self.config.lock_ttl(),
        )
        .await?
        .ok_or_else(|| RotationError::LockHeld {
            client_id: client_id.to_string(),
        })
    }

    async fn emit(&self, record: &RotationRecord, from: &str, to: &str) {
        let event = RotationEvent::now(
            record.client_id.clone(),
            from,
            to,
            record.old_version.as_str(),
            record.new_version.as_str(),
        );
        if let Err(e) = self.events.emit(&event).await {
            warn!(client_id = %record.client_id, error = %e, "event emission failed");
        }
    }
}

fn chrono_period(period: std::time::Duration) -> ChronoDuration {
    ChronoDuration::from_std(period).unwrap_or_else(|_| ChronoDuration::seconds(86_400))
}
