//! Rotation record, phases, and statistics
//!
//! The controller persists one [`RotationRecord`] per in-flight rotation at
//! `rotation/<client_id>`. The record is the durable face of the state
//! machine; live per-version counters come from
//! [`crate::usage::UsageCounters`] and are snapshotted into
//! [`RotationStats`] on each persisted transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ClientId;

/// Phase of an in-flight rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RotationPhase {
    /// New credential generated and stored, not yet advertised (transient)
    Initiated,
    /// Both secrets authenticate
    DualActive,
    /// Both authenticate; old-secret use is flagged for migration
    OldDeprecated,
    /// Old credential deactivated, rotation wrapping up
    Retired,
    /// Rotation finished; record kept until archived
    Completed,
    /// Rotation abandoned from INITIATED or DUAL_ACTIVE
    Aborted,
}

impl RotationPhase {
    /// True while the rotation still needs controller attention.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Initiated | Self::DualActive | Self::OldDeprecated | Self::Retired)
    }

    /// Legal next phases from this one.
    pub fn successors(self) -> &'static [RotationPhase] {
        match self {
            Self::Initiated => &[Self::DualActive, Self::Aborted],
            Self::DualActive => &[Self::OldDeprecated, Self::Aborted],
            Self::OldDeprecated => &[Self::Retired],
            Self::Retired => &[Self::Completed],
            Self::Completed | Self::Aborted => &[],
        }
    }

    /// True when the state graph allows `self -> to`.
    pub fn can_transition_to(self, to: RotationPhase) -> bool {
        self.successors().contains(&to)
    }
}

impl std::fmt::Display for RotationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initiated => "INITIATED",
            Self::DualActive => "DUAL_ACTIVE",
            Self::OldDeprecated => "OLD_DEPRECATED",
            Self::Retired => "RETIRED",
            Self::Completed => "COMPLETED",
            Self::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

/// Which credential version authenticated how often during a rotation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationStats {
    /// Successful authentications with the old secret
    pub old_auth_count: u64,

    /// Successful authentications with the new secret
    pub new_auth_count: u64,

    /// Old-secret authentications that happened after deprecation
    pub old_deprecated_count: u64,
}

/// Durable record of one rotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationRecord {
    /// Client whose credential is rotating
    pub client_id: ClientId,

    /// Current phase
    pub state: RotationPhase,

    /// Version being phased out
    pub old_version: String,

    /// Version being phased in
    pub new_version: String,

    /// Operator-supplied reason for the rotation
    pub reason: String,

    /// When the rotation started
    pub started_at: DateTime<Utc>,

    /// Earliest time the current phase may advance
    pub transition_deadline: DateTime<Utc>,

    /// Set once the rotation completes or aborts
    pub completed_at: Option<DateTime<Utc>>,

    /// Snapshot of per-version authentication counters
    pub stats: RotationStats,
}

impl RotationRecord {
    /// Creates a record in the INITIATED phase.
    pub fn new(
        client_id: ClientId,
        old_version: impl Into<String>,
        new_version: impl Into<String>,
        reason: impl Into<String>,
        transition_deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            client_id,
            state: RotationPhase::Initiated,
            old_version: old_version.into(),
            new_version: new_version.into(),
            reason: reason.into(),
            started_at: Utc::now(),
            transition_deadline,
            completed_at: None,
            stats: RotationStats::default(),
        }
    }

    /// True while the controller still owns this record.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}
