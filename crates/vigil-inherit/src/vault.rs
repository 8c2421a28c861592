//! Vault records: the vault itself, its encrypted fragments, attestations
//! and the append-only check-in log.

use crate::policy::Scheme;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type VaultId = Uuid;
pub type PartyId = Uuid;

/// Lifecycle status of a vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultStatus {
    /// Owner is checking in on schedule
    Active,
    /// Check-in overdue, grace period running
    Warning,
    /// Grace elapsed or attestation quorum reached; claimable
    Triggered,
    /// A beneficiary claimed the vault. Terminal.
    Claimed,
}

impl VaultStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VaultStatus::Active => "active",
            VaultStatus::Warning => "warning",
            VaultStatus::Triggered => "triggered",
            VaultStatus::Claimed => "claimed",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == VaultStatus::Claimed
    }
}

impl fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VaultStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(VaultStatus::Active),
            "warning" => Ok(VaultStatus::Warning),
            "triggered" => Ok(VaultStatus::Triggered),
            "claimed" => Ok(VaultStatus::Claimed),
            other => Err(format!("unknown vault status: {other}")),
        }
    }
}

/// One party's attestation within a trigger cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub party_id: PartyId,
    pub attested_at: DateTime<Utc>,
}

/// A vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub id: VaultId,
    /// Owner identity (email)
    pub owner: String,
    pub check_in_interval_days: u32,
    pub grace_period_days: u32,
    pub status: VaultStatus,
    pub last_check_in_at: DateTime<Utc>,
    pub next_check_in_due: DateTime<Utc>,
    /// Scheme used at creation. `None` only for legacy vaults.
    pub fragment_scheme: Option<Scheme>,
    pub triggered_at: Option<DateTime<Utc>>,
    /// Increments whenever the owner resets the clock; scopes attestations
    pub trigger_cycle: u32,
    /// Attestations for the current cycle
    pub attestations: Vec<Attestation>,
    pub claimed_by: Option<PartyId>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped by the store on every write
    pub version: u64,
}

impl Vault {
    /// Fresh, active vault whose first check-in is due one interval from `now`
    pub fn new(
        owner: impl Into<String>,
        check_in_interval_days: u32,
        grace_period_days: u32,
        scheme: Scheme,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            check_in_interval_days,
            grace_period_days,
            status: VaultStatus::Active,
            last_check_in_at: now,
            next_check_in_due: now + Duration::days(check_in_interval_days as i64),
            fragment_scheme: Some(scheme),
            triggered_at: None,
            trigger_cycle: 0,
            attestations: Vec::new(),
            claimed_by: None,
            claimed_at: None,
            created_at: now,
            version: 0,
        }
    }

    pub fn check_in_interval(&self) -> Duration {
        Duration::days(self.check_in_interval_days as i64)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::days(self.grace_period_days as i64)
    }

    /// Instant after which an unanswered check-in triggers the vault
    pub fn grace_deadline(&self) -> DateTime<Utc> {
        self.next_check_in_due + self.grace_period()
    }

    pub fn has_attested(&self, party_id: PartyId) -> bool {
        self.attestations.iter().any(|a| a.party_id == party_id)
    }

    /// Restart the check-in clock and open a new trigger cycle
    pub(crate) fn restart_clock(&mut self, now: DateTime<Utc>) {
        self.status = VaultStatus::Active;
        self.last_check_in_at = now;
        self.next_check_in_due = now + self.check_in_interval();
        self.triggered_at = None;
        self.attestations.clear();
        self.trigger_cycle += 1;
    }
}

/// One guardian's encrypted share, as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub vault_id: VaultId,
    pub guardian_id: PartyId,
    pub fragment_index: u32,
    /// JSON envelope (see `vigil_core::crypto`)
    pub encrypted_data: String,
    /// Audit string, not key material
    pub derivation_salt: String,
}

/// An owner liveness proof, appended to the check-in log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckIn {
    pub vault_id: VaultId,
    pub signature: String,
    pub message: Option<String>,
    pub ip_address: Option<String>,
    pub checked_in_at: DateTime<Utc>,
}
