//! Vault lifecycle state machine.
//!
//! Pure logic, no I/O and no clock. Status is a function of the vault's
//! timestamps, its attestations and the `now` supplied by the caller, so any
//! external sweep can re-evaluate a vault at any time.
//!
//! ```text
//! |--- Active ---|--- Warning ---|--- Triggered ---|--- Claimed
//!              due          due + grace        (beneficiary)
//! ```
//!
//! A check-in before `Triggered` restarts the clock. An attestation quorum
//! triggers early. Within the revoke window after triggering, the owner may
//! return the vault to `Active`.

use crate::error::VaultError;
use crate::events::{LifecycleEvent, TriggerReason};
use crate::party::{Party, PartyRegistry, PartyRole};
use crate::policy::{LifecyclePolicy, PolicyError};
use crate::vault::{Attestation, Vault, VaultStatus};
use chrono::{DateTime, Utc};
use vigil_core::normalize_identity;

/// Result of evaluating a vault at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub status: VaultStatus,
    pub triggered_at: Option<DateTime<Utc>>,
    pub reason: Option<TriggerReason>,
}

/// Attestations needed to trigger, given the parties actually able to attest
///
/// `min(configured, eligible)` and never below one, so a vault with fewer
/// eligible attestors than the configured quorum can still be triggered.
pub fn effective_quorum(policy: &LifecyclePolicy, parties: &PartyRegistry) -> usize {
    let eligible = parties.eligible_attestors(policy.attestation_roles);
    policy.attestation_quorum.min(eligible).max(1)
}

/// Compute a vault's status at `now`
pub fn evaluate(vault: &Vault, now: DateTime<Utc>, quorum: usize) -> Evaluation {
    match vault.status {
        VaultStatus::Claimed | VaultStatus::Triggered => {
            return Evaluation {
                status: vault.status,
                triggered_at: vault.triggered_at,
                reason: None,
            }
        }
        VaultStatus::Active | VaultStatus::Warning => {}
    }

    let quorum = quorum.max(1);
    let by_attestation = vault
        .attestations
        .get(quorum - 1)
        .map(|a| (a.attested_at, TriggerReason::Attestation));

    let deadline = vault.grace_deadline();
    let by_grace = (now > deadline).then_some((deadline, TriggerReason::GraceElapsed));

    let trigger = match (by_attestation, by_grace) {
        (Some(a), Some(g)) => Some(if a.0 <= g.0 { a } else { g }),
        (a, g) => a.or(g),
    };

    if let Some((at, reason)) = trigger {
        return Evaluation {
            status: VaultStatus::Triggered,
            triggered_at: Some(at),
            reason: Some(reason),
        };
    }

    let status = if now > vault.next_check_in_due {
        VaultStatus::Warning
    } else {
        VaultStatus::Active
    };
    Evaluation {
        status,
        triggered_at: None,
        reason: None,
    }
}

/// Apply the evaluation at `now` to the vault, returning transition events
pub fn refresh(vault: &mut Vault, now: DateTime<Utc>, quorum: usize) -> Vec<LifecycleEvent> {
    let eval = evaluate(vault, now, quorum);
    if eval.status == vault.status {
        return Vec::new();
    }

    let mut events = Vec::new();
    match eval.status {
        VaultStatus::Warning => events.push(LifecycleEvent::EnteredWarning {
            vault_id: vault.id,
            grace_deadline: vault.grace_deadline(),
        }),
        VaultStatus::Triggered => {
            if let (Some(triggered_at), Some(reason)) = (eval.triggered_at, eval.reason) {
                events.push(LifecycleEvent::Triggered {
                    vault_id: vault.id,
                    reason,
                    triggered_at,
                });
            }
        }
        VaultStatus::Active | VaultStatus::Claimed => {}
    }

    log::debug!(
        "Vault {} moved {} -> {}",
        vault.id,
        vault.status,
        eval.status
    );
    vault.status = eval.status;
    vault.triggered_at = eval.triggered_at;
    events
}

/// Whether the owner may still revoke a trigger at `now`
pub fn can_revoke(vault: &Vault, now: DateTime<Utc>, quorum: usize, policy: &LifecyclePolicy) -> bool {
    let eval = evaluate(vault, now, quorum);
    match (eval.status, eval.triggered_at) {
        (VaultStatus::Triggered, Some(at)) => now <= at + policy.revoke_window(),
        _ => false,
    }
}

pub(crate) fn ensure_not_finalized(vault: &Vault) -> Result<(), VaultError> {
    if vault.status == VaultStatus::Claimed {
        return Err(VaultError::VaultFinalized);
    }
    Ok(())
}

fn ensure_member(vault: &Vault, party: &Party, action: &'static str) -> Result<(), VaultError> {
    if party.vault_id != vault.id {
        return Err(VaultError::PartyNotFound);
    }
    if !party.is_accepted() {
        return Err(PolicyError::NotPermitted { action }.into());
    }
    Ok(())
}

/// Record a verified owner check-in
///
/// Permitted while `Active` or `Warning`; restarts the clock and clears any
/// partial attestations. The liveness signature must already be verified.
pub fn check_in(
    vault: &mut Vault,
    now: DateTime<Utc>,
    quorum: usize,
) -> Result<Vec<LifecycleEvent>, VaultError> {
    ensure_not_finalized(vault)?;

    let mut events = refresh(vault, now, quorum);
    if vault.status == VaultStatus::Triggered {
        return Err(VaultError::InvalidState {
            status: vault.status,
            action: "check in",
        });
    }

    vault.restart_clock(now);
    events.push(LifecycleEvent::CheckedIn {
        vault_id: vault.id,
        next_check_in_due: vault.next_check_in_due,
    });
    Ok(events)
}

/// Record a death/incapacity attestation
///
/// One attestation per party per trigger cycle; repeats, and attestations
/// on an already-triggered vault, are no-ops.
pub fn attest(
    vault: &mut Vault,
    party: &Party,
    now: DateTime<Utc>,
    quorum: usize,
    policy: &LifecyclePolicy,
) -> Result<Vec<LifecycleEvent>, VaultError> {
    ensure_not_finalized(vault)?;
    ensure_member(vault, party, "attest")?;
    if !party.role_may_attest(policy.attestation_roles) {
        return Err(PolicyError::NotPermitted { action: "attest" }.into());
    }

    let mut events = refresh(vault, now, quorum);
    if vault.status == VaultStatus::Triggered || vault.has_attested(party.id) {
        return Ok(events);
    }

    vault.attestations.push(Attestation {
        party_id: party.id,
        attested_at: now,
    });
    events.push(LifecycleEvent::AttestationRecorded {
        vault_id: vault.id,
        party_id: party.id,
        count: vault.attestations.len(),
        quorum,
    });
    events.extend(refresh(vault, now, quorum));
    Ok(events)
}

/// Beneficiary claim; only while `Triggered`
pub fn claim(
    vault: &mut Vault,
    party: &Party,
    now: DateTime<Utc>,
    quorum: usize,
) -> Result<Vec<LifecycleEvent>, VaultError> {
    ensure_not_finalized(vault)?;
    ensure_member(vault, party, "claim")?;
    if party.role != PartyRole::Beneficiary {
        return Err(PolicyError::NotPermitted { action: "claim" }.into());
    }

    let mut events = refresh(vault, now, quorum);
    if vault.status != VaultStatus::Triggered {
        return Err(VaultError::InvalidState {
            status: vault.status,
            action: "claim",
        });
    }

    vault.status = VaultStatus::Claimed;
    vault.claimed_by = Some(party.id);
    vault.claimed_at = Some(now);
    events.push(LifecycleEvent::Claimed {
        vault_id: vault.id,
        party_id: party.id,
    });
    Ok(events)
}

/// Owner emergency revoke: `Triggered -> Active` within the revoke window
pub fn revoke(
    vault: &mut Vault,
    requester: &str,
    now: DateTime<Utc>,
    quorum: usize,
    policy: &LifecyclePolicy,
) -> Result<Vec<LifecycleEvent>, VaultError> {
    ensure_not_finalized(vault)?;
    if normalize_identity(requester) != normalize_identity(&vault.owner) {
        return Err(PolicyError::NotOwner("revoke a trigger").into());
    }

    let mut events = refresh(vault, now, quorum);
    if vault.status != VaultStatus::Triggered {
        return Err(VaultError::InvalidState {
            status: vault.status,
            action: "revoke",
        });
    }
    if !can_revoke(vault, now, quorum, policy) {
        return Err(VaultError::RevokeWindowClosed);
    }

    vault.restart_clock(now);
    events.push(LifecycleEvent::Revoked {
        vault_id: vault.id,
        next_check_in_due: vault.next_check_in_due,
    });
    Ok(events)
}
