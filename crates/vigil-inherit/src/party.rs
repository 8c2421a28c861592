//! Parties attached to a vault: guardians, beneficiaries and attestors
//!
//! Handles party-set validation at creation time and invitation acceptance.

use crate::error::VaultError;
use crate::policy::{AttestationRoles, PolicyError, TierLimits};
use crate::vault::{PartyId, VaultId};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;
use vigil_core::normalize_identity;

/// Invitation token entropy in bytes
const INVITE_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    /// Holds an encrypted fragment
    Guardian,
    /// May claim the vault once triggered
    Beneficiary,
    /// May attest to the owner's death or incapacity
    Attestor,
}

impl PartyRole {
    pub fn as_str(self) -> &'static str {
        match self {
            PartyRole::Guardian => "guardian",
            PartyRole::Beneficiary => "beneficiary",
            PartyRole::Attestor => "attestor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "guardian" => Some(PartyRole::Guardian),
            "beneficiary" => Some(PartyRole::Beneficiary),
            "attestor" => Some(PartyRole::Attestor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyStatus {
    /// Invited, not yet accepted
    Pending,
    Accepted,
    /// Removed by the owner; keeps its row for audit
    Revoked,
}

impl PartyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PartyStatus::Pending => "pending",
            PartyStatus::Accepted => "accepted",
            PartyStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PartyStatus::Pending),
            "accepted" => Some(PartyStatus::Accepted),
            "revoked" => Some(PartyStatus::Revoked),
            _ => None,
        }
    }
}

/// Party details supplied by the owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl PartyInput {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub vault_id: VaultId,
    pub role: PartyRole,
    pub name: String,
    /// Normalized (trimmed, lowercase)
    pub email: String,
    pub phone: Option<String>,
    pub invite_token: String,
    pub invite_expires_at: DateTime<Utc>,
    pub status: PartyStatus,
}

impl Party {
    /// New pending party with a fresh invitation
    pub fn invite(
        vault_id: VaultId,
        role: PartyRole,
        input: &PartyInput,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            vault_id,
            role,
            name: input.name.trim().to_string(),
            email: normalize_identity(&input.email),
            phone: input.phone.clone(),
            invite_token: generate_invite_token(),
            invite_expires_at: now + ttl,
            status: PartyStatus::Pending,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == PartyStatus::Accepted
    }

    /// Whether this party's role may attest under `roles`
    pub fn role_may_attest(&self, roles: AttestationRoles) -> bool {
        match (self.role, roles) {
            (PartyRole::Attestor, _) => true,
            (PartyRole::Guardian, AttestationRoles::GuardiansAndAttestors) => true,
            _ => false,
        }
    }

    /// Accept the invitation
    ///
    /// Returns `Ok(true)` if the status changed, `Ok(false)` if the party had
    /// already accepted.
    pub fn accept(&mut self, now: DateTime<Utc>) -> Result<bool, VaultError> {
        match self.status {
            PartyStatus::Accepted => Ok(false),
            PartyStatus::Revoked => Err(VaultError::InviteRevoked),
            PartyStatus::Pending if now > self.invite_expires_at => Err(VaultError::InviteExpired),
            PartyStatus::Pending => {
                self.status = PartyStatus::Accepted;
                Ok(true)
            }
        }
    }
}

fn generate_invite_token() -> String {
    let mut bytes = [0u8; INVITE_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Minimal shape check: `local@domain` with a dot in the domain
fn validate_email(email: &str) -> Result<(), VaultError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(VaultError::Validation(format!("invalid email: {email}")))
    }
}

/// Validate the party sets for a new vault
///
/// Checks counts against the tier, email shape, duplicate guardians and
/// guardian/beneficiary overlap. Identities compare case-insensitively.
pub fn validate_party_sets(
    guardians: &[PartyInput],
    beneficiaries: &[PartyInput],
    attestors: &[PartyInput],
    limits: &TierLimits,
) -> Result<(), VaultError> {
    if guardians.is_empty() {
        return Err(VaultError::Validation("at least one guardian is required".into()));
    }
    if beneficiaries.is_empty() {
        return Err(VaultError::Validation(
            "at least one beneficiary is required".into(),
        ));
    }
    if guardians.len() > limits.max_guardians {
        return Err(PolicyError::TooManyGuardians {
            max: limits.max_guardians,
            got: guardians.len(),
        }
        .into());
    }
    if beneficiaries.len() > limits.max_beneficiaries {
        return Err(PolicyError::TooManyBeneficiaries {
            max: limits.max_beneficiaries,
            got: beneficiaries.len(),
        }
        .into());
    }

    for party in guardians.iter().chain(beneficiaries).chain(attestors) {
        if party.name.trim().is_empty() {
            return Err(VaultError::Validation("party name is empty".into()));
        }
        validate_email(party.email.trim())?;
    }

    let mut guardian_ids = HashSet::new();
    for guardian in guardians {
        let id = normalize_identity(&guardian.email);
        if !guardian_ids.insert(id.clone()) {
            return Err(PolicyError::DuplicateGuardian(id).into());
        }
    }

    for beneficiary in beneficiaries {
        let id = normalize_identity(&beneficiary.email);
        if guardian_ids.contains(&id) {
            return Err(PolicyError::GuardianBeneficiaryOverlap(id).into());
        }
    }

    Ok(())
}

/// Parties of one vault, with role lookups
#[derive(Debug, Clone, Default)]
pub struct PartyRegistry {
    parties: Vec<Party>,
}

impl PartyRegistry {
    pub fn new(parties: Vec<Party>) -> Self {
        Self { parties }
    }

    pub fn get(&self, id: PartyId) -> Option<&Party> {
        self.parties.iter().find(|p| p.id == id)
    }

    pub fn with_role(&self, role: PartyRole) -> impl Iterator<Item = &Party> {
        self.parties.iter().filter(move |p| p.role == role)
    }

    /// Parties that may attest and have not been revoked
    ///
    /// Pending parties count. Otherwise the first party to accept would hold
    /// a quorum of one on a freshly created vault.
    pub fn eligible_attestors(&self, roles: AttestationRoles) -> usize {
        self.parties
            .iter()
            .filter(|p| p.status != PartyStatus::Revoked && p.role_may_attest(roles))
            .count()
    }

    pub fn list(&self) -> &[Party] {
        &self.parties
    }

    pub fn len(&self) -> usize {
        self.parties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }
}
