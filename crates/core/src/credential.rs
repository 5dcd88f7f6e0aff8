//! Credential data model and the per-client credential record
//!
//! The vault stores one [`CredentialRecord`] per client at
//! `payment/api/credentials/<client_id>`. Outside of rotation the record
//! holds a single active version; during rotation it holds the rotating
//! pair. Invariants (one credential per version, at most two versions in a
//! rotating state) are enforced on every mutation so a bad write can never
//! reach the vault.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::ClientId;

/// Rotation lifecycle state carried by each stored credential version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RotationState {
    /// Sole active credential, no rotation in progress
    Normal,
    /// One of the two secrets accepted during the rotation window
    DualActive,
    /// Still accepted, but authentications with it are flagged for migration
    OldDeprecated,
    /// Deactivated and kept for audit only
    Retired,
}

impl RotationState {
    /// True when a credential in this state may authenticate at all.
    pub fn accepts_authentication(self) -> bool {
        !matches!(self, Self::Retired)
    }
}

impl std::fmt::Display for RotationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Normal => "NORMAL",
            Self::DualActive => "DUAL_ACTIVE",
            Self::OldDeprecated => "OLD_DEPRECATED",
            Self::Retired => "RETIRED",
        };
        f.write_str(name)
    }
}

/// A single stored credential version
///
/// Only the salted hash of the secret is ever stored; the plaintext exists
/// solely in the caller's [`crate::secret::SecretString`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Owning client
    pub client_id: ClientId,

    /// Argon2id PHC-format hash of the secret
    pub hashed_secret: String,

    /// Monotonic version label (`v1`, `v2`, ...)
    pub version: String,

    /// Deactivated credentials never authenticate
    pub active: bool,

    /// Where this version sits in the rotation lifecycle
    pub rotation_state: RotationState,

    /// When this version was created
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,

    /// Optional hard expiry
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Creates a fresh active credential version in the given state.
    pub fn new(
        client_id: ClientId,
        hashed_secret: String,
        version: impl Into<String>,
        rotation_state: RotationState,
    ) -> Self {
        let now = Utc::now();
        Self {
            client_id,
            hashed_secret,
            version: version.into(),
            active: true,
            rotation_state,
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }

    /// True when the hard expiry (if any) has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// True when this version may authenticate: active, unexpired, and not
    /// retired.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.active && !self.is_expired(now) && self.rotation_state.accepts_authentication()
    }
}

/// The per-client credential document stored in the vault
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Owning client
    pub client_id: ClientId,

    /// All known versions, retired ones included (kept for audit)
    pub credentials: Vec<Credential>,
}

impl CredentialRecord {
    /// Creates an empty record for a client.
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            credentials: Vec::new(),
        }
    }

    /// Creates a record holding a single credential version.
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            client_id: credential.client_id.clone(),
            credentials: vec![credential],
        }
    }

    /// Credentials that may authenticate right now, retired ones filtered.
    pub fn usable(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Credential> {
        self.credentials.iter().filter(move |c| c.is_usable(now))
    }

    /// Looks up a version.
    pub fn by_version(&self, version: &str) -> Option<&Credential> {
        self.credentials.iter().find(|c| c.version == version)
    }

    /// Looks up a version for mutation.
    pub fn by_version_mut(&mut self, version: &str) -> Option<&mut Credential> {
        self.credentials.iter_mut().find(|c| c.version == version)
    }

    /// The sole NORMAL-state credential, if the client is not mid-rotation.
    pub fn normal_credential(&self) -> Option<&Credential> {
        self.credentials
            .iter()
            .find(|c| c.active && c.rotation_state == RotationState::Normal)
    }

    /// Next monotonic version label (`v1` for an empty record).
    pub fn next_version(&self) -> String {
        let highest = self
            .credentials
            .iter()
            .filter_map(|c| c.version.strip_prefix('v'))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        format!("v{}", highest + 1)
    }

    /// Earliest expiry among usable credentials, if any carries one.
    pub fn earliest_usable_expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.usable(now).filter_map(|c| c.expires_at).min()
    }

    /// Inserts a new version, enforcing record invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::RecordInvariant`] when the version already
    /// exists, belongs to another client, or a third rotating version would
    /// be introduced.
    pub fn insert(&mut self, credential: Credential) -> Result<(), ValidationError> {
        if credential.client_id != self.client_id {
            return Err(ValidationError::RecordInvariant {
                client_id: self.client_id.to_string(),
                reason: format!(
                    "credential belongs to '{}', not this record",
                    credential.client_id
                ),
            });
        }

        if self.by_version(&credential.version).is_some() {
            return Err(ValidationError::RecordInvariant {
                client_id: self.client_id.to_string(),
                reason: format!("version '{}' already exists", credential.version),
            });
        }

        let rotating = self
            .credentials
            .iter()
            .chain(std::iter::once(&credential))
            .filter(|c| {
                matches!(
                    c.rotation_state,
                    RotationState::DualActive | RotationState::OldDeprecated
                )
            })
            .count();
        if rotating > 2 {
            return Err(ValidationError::RecordInvariant {
                client_id: self.client_id.to_string(),
                reason: "more than two credentials in a rotating state".to_string(),
            });
        }

        self.credentials.push(credential);
        Ok(())
    }

    /// Removes a version outright (rotation abort path).
    pub fn remove_version(&mut self, version: &str) -> bool {
        let before = self.credentials.len();
        self.credentials.retain(|c| c.version != version);
        self.credentials.len() != before
    }

    /// Moves a version into a new rotation state, stamping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::RecordInvariant`] for an unknown version.
    pub fn set_state(
        &mut self,
        version: &str,
        state: RotationState,
    ) -> Result<(), ValidationError> {
        let client_id = self.client_id.to_string();
        let credential =
            self.by_version_mut(version)
                .ok_or_else(|| ValidationError::RecordInvariant {
                    client_id,
                    reason: format!("version '{version}' not found"),
                })?;
        credential.rotation_state = state;
        if state == RotationState::Retired {
            credential.active = false;
        }
        credential.updated_at = Utc::now();
        Ok(())
    }
}
