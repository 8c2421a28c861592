//! Lifecycle events emitted by vault transitions.
//!
//! Mutating operations and the sweep return these so a notification
//! collaborator can act on them. Nothing here delivers anything.

use crate::vault::{PartyId, VaultId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a vault was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    /// Check-in deadline plus grace period passed
    GraceElapsed,
    /// Attestation quorum reached
    Attestation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    EnteredWarning {
        vault_id: VaultId,
        grace_deadline: DateTime<Utc>,
    },
    Triggered {
        vault_id: VaultId,
        reason: TriggerReason,
        triggered_at: DateTime<Utc>,
    },
    CheckedIn {
        vault_id: VaultId,
        next_check_in_due: DateTime<Utc>,
    },
    AttestationRecorded {
        vault_id: VaultId,
        party_id: PartyId,
        count: usize,
        quorum: usize,
    },
    Claimed {
        vault_id: VaultId,
        party_id: PartyId,
    },
    Revoked {
        vault_id: VaultId,
        next_check_in_due: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn vault_id(&self) -> VaultId {
        match self {
            LifecycleEvent::EnteredWarning { vault_id, .. }
            | LifecycleEvent::Triggered { vault_id, .. }
            | LifecycleEvent::CheckedIn { vault_id, .. }
            | LifecycleEvent::AttestationRecorded { vault_id, .. }
            | LifecycleEvent::Claimed { vault_id, .. }
            | LifecycleEvent::Revoked { vault_id, .. } => *vault_id,
        }
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            LifecycleEvent::EnteredWarning { .. } => "entered_warning",
            LifecycleEvent::Triggered { .. } => "triggered",
            LifecycleEvent::CheckedIn { .. } => "checked_in",
            LifecycleEvent::AttestationRecorded { .. } => "attestation_recorded",
            LifecycleEvent::Claimed { .. } => "claimed",
            LifecycleEvent::Revoked { .. } => "revoked",
        }
    }
}
