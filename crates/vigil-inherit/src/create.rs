//! Vault creation
//!
//! Validates the request, generates a master secret, splits it once, then
//! derives a passphrase and encrypts a fragment for every guardian in
//! parallel. Nothing is persisted here; the caller stores the resulting
//! [`NewVault`] in a single transaction.

use crate::error::VaultError;
use crate::party::{validate_party_sets, Party, PartyInput, PartyRole};
use crate::policy::{LifecyclePolicy, Scheme, TierLimits, CHECK_IN_INTERVAL_DAYS, GRACE_PERIOD_DAYS};
use crate::store::NewVault;
use crate::vault::{Fragment, PartyId, Vault};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use vigil_core::{derivation_salt, derive_passphrase, seal_to_envelope, CipherParams, MasterSecret};
use zeroize::Zeroizing;

/// Owner's request to create a vault
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVaultRequest {
    pub owner: String,
    pub check_in_interval_days: u32,
    pub grace_period_days: u32,
    pub guardians: Vec<PartyInput>,
    pub beneficiaries: Vec<PartyInput>,
    #[serde(default)]
    pub attestors: Vec<PartyInput>,
}

impl CreateVaultRequest {
    /// Validate everything that can be checked before generating keys
    pub fn validate(&self, limits: &TierLimits) -> Result<(), VaultError> {
        if self.owner.trim().is_empty() {
            return Err(VaultError::Validation("owner identity is empty".into()));
        }
        if !CHECK_IN_INTERVAL_DAYS.contains(&self.check_in_interval_days) {
            return Err(VaultError::Validation(format!(
                "check_in_interval_days must be in {}..={}, got {}",
                CHECK_IN_INTERVAL_DAYS.start(),
                CHECK_IN_INTERVAL_DAYS.end(),
                self.check_in_interval_days
            )));
        }
        if !GRACE_PERIOD_DAYS.contains(&self.grace_period_days) {
            return Err(VaultError::Validation(format!(
                "grace_period_days must be in {}..={}, got {}",
                GRACE_PERIOD_DAYS.start(),
                GRACE_PERIOD_DAYS.end(),
                self.grace_period_days
            )));
        }
        validate_party_sets(&self.guardians, &self.beneficiaries, &self.attestors, limits)
    }
}

/// A guardian's passphrase, handed out once at creation
pub struct GuardianPassphrase {
    pub guardian_id: PartyId,
    pub email: String,
    pub fragment_index: u32,
    pub passphrase: Zeroizing<String>,
}

impl fmt::Debug for GuardianPassphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardianPassphrase")
            .field("guardian_id", &self.guardian_id)
            .field("email", &self.email)
            .field("fragment_index", &self.fragment_index)
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

/// A share with no guardian to hold it, returned to the owner in plain hex
///
/// Only produced when there are fewer guardians than the scheme's share count.
pub struct OwnerShare {
    pub fragment_index: u32,
    pub share: Zeroizing<String>,
}

impl fmt::Debug for OwnerShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerShare")
            .field("fragment_index", &self.fragment_index)
            .field("share", &"[REDACTED]")
            .finish()
    }
}

/// Result of a successful creation
///
/// The master secret, passphrases and owner shares are not stored anywhere;
/// this is the only time they are available.
#[derive(Debug)]
pub struct CreatedVault {
    pub vault: Vault,
    pub parties: Vec<Party>,
    pub master_secret: MasterSecret,
    pub passphrases: Vec<GuardianPassphrase>,
    pub owner_shares: Vec<OwnerShare>,
}

/// Build the records and one-time secrets for a new vault
pub fn prepare_vault(
    request: &CreateVaultRequest,
    now: DateTime<Utc>,
    limits: &TierLimits,
    lifecycle: &LifecyclePolicy,
    cipher: &CipherParams,
) -> Result<(NewVault, CreatedVault), VaultError> {
    request.validate(limits)?;

    let scheme = Scheme::for_guardian_count(request.guardians.len());
    let vault = Vault::new(
        request.owner.trim(),
        request.check_in_interval_days,
        request.grace_period_days,
        scheme,
        now,
    );

    let ttl = lifecycle.invite_ttl();
    let invite = |role: PartyRole, inputs: &[PartyInput]| -> Vec<Party> {
        inputs
            .iter()
            .map(|input| Party::invite(vault.id, role, input, now, ttl))
            .collect()
    };
    let guardians = invite(PartyRole::Guardian, &request.guardians);
    let beneficiaries = invite(PartyRole::Beneficiary, &request.beneficiaries);
    let attestors = invite(PartyRole::Attestor, &request.attestors);

    let master = MasterSecret::generate();
    let shares = scheme
        .shamir_config(guardians.len())
        .split(master.as_bytes())?;

    let sealed: Vec<(Fragment, GuardianPassphrase)> = guardians
        .par_iter()
        .zip(shares.par_iter())
        .enumerate()
        .map(|(i, (guardian, share))| {
            let index = i as u32;
            let passphrase = derive_passphrase(master.as_bytes(), &guardian.email, index)?;
            let encoded = share.to_hex();
            let envelope = seal_to_envelope(encoded.as_bytes(), &passphrase, cipher)?;
            let fragment = Fragment {
                vault_id: vault.id,
                guardian_id: guardian.id,
                fragment_index: index,
                encrypted_data: envelope,
                derivation_salt: derivation_salt(&guardian.email, index),
            };
            let issued = GuardianPassphrase {
                guardian_id: guardian.id,
                email: guardian.email.clone(),
                fragment_index: index,
                passphrase,
            };
            Ok::<_, VaultError>((fragment, issued))
        })
        .collect::<Result<_, _>>()?;

    let (fragments, passphrases): (Vec<_>, Vec<_>) = sealed.into_iter().unzip();

    // Shares past the guardian count go back to the owner unencrypted
    let owner_shares: Vec<OwnerShare> = shares
        .iter()
        .enumerate()
        .skip(guardians.len())
        .map(|(i, share)| OwnerShare {
            fragment_index: i as u32,
            share: share.to_hex(),
        })
        .collect();
    if guardians.len() < scheme.threshold() as usize {
        log::warn!(
            "Vault {} has {} guardian(s) for {}; recovery needs an owner share",
            vault.id,
            guardians.len(),
            scheme
        );
    }

    log::info!(
        "Prepared vault {} ({}, {} guardians, {} beneficiaries, {} attestors)",
        vault.id,
        scheme,
        guardians.len(),
        beneficiaries.len(),
        attestors.len()
    );

    let parties: Vec<Party> = guardians
        .into_iter()
        .chain(beneficiaries)
        .chain(attestors)
        .collect();

    let record = NewVault {
        vault: vault.clone(),
        parties: parties.clone(),
        fragments,
    };
    let created = CreatedVault {
        vault,
        parties,
        master_secret: master,
        passphrases,
        owner_shares,
    };
    Ok((record, created))
}
