//! End-to-end vault scenarios on the SQLite store.
//!
//! Each test drives the public service API the way the daemon and an
//! HTTP front end would: create, invite, check in, attest, claim, recover.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;

use vigil_core::CipherParams;
use vigil_inherit::{
    CheckInRequest, CreateVaultRequest, CreatedVault, LifecycleEvent, PartyInput, PartyRole,
    ProvidedFragment, RecoveryRequest, Scheme, TriggerReason, VaultError, VaultService,
    VaultStatus, VaultStore,
};
use vigil_server::db::SqliteStore;

const OWNER: &str = "owner@example.com";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn setup() -> (TempDir, VaultService<SqliteStore>) {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(&dir.path().join("vigil.db")).unwrap();
    let svc = VaultService::new(Arc::new(store)).with_cipher(CipherParams::interactive());
    (dir, svc)
}

fn guardians(n: usize) -> Vec<PartyInput> {
    (0..n)
        .map(|i| PartyInput::new(format!("Guardian {i}"), format!("guardian{i}@example.com")))
        .collect()
}

fn request(guardian_count: usize) -> CreateVaultRequest {
    CreateVaultRequest {
        owner: OWNER.into(),
        check_in_interval_days: 30,
        grace_period_days: 7,
        guardians: guardians(guardian_count),
        beneficiaries: vec![PartyInput::new("Heir", "heir@example.com")],
        attestors: vec![],
    }
}

/// Encrypted fragments paired with their passphrases, by fragment index
fn provided(svc: &VaultService<SqliteStore>, created: &CreatedVault) -> Vec<ProvidedFragment> {
    let fragments = svc.fragments(created.vault.id).unwrap();
    created
        .passphrases
        .iter()
        .map(|p| {
            let fragment = fragments
                .iter()
                .find(|f| f.fragment_index == p.fragment_index)
                .unwrap();
            ProvidedFragment::encrypted(fragment.encrypted_data.clone(), p.passphrase.as_str())
        })
        .collect()
}

fn accept_all(svc: &VaultService<SqliteStore>, created: &CreatedVault) {
    for party in svc.parties(created.vault.id).unwrap() {
        svc.accept_invite(&party.invite_token, t0()).unwrap();
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_silent_owner_triggers_after_interval_plus_grace() {
    let (_dir, svc) = setup();
    let id = svc.create_vault(&request(3), t0()).unwrap().vault.id;

    let events = svc.sweep(t0() + Duration::days(38)).unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        LifecycleEvent::Triggered {
            reason: TriggerReason::GraceElapsed,
            ..
        }
    ));
    assert_eq!(
        svc.store().vault(id).unwrap().unwrap().status,
        VaultStatus::Triggered
    );
}

#[test]
fn test_check_in_one_second_before_trigger_wins() {
    let (_dir, svc) = setup();
    let id = svc.create_vault(&request(3), t0()).unwrap().vault.id;

    // Trigger fires strictly after the grace deadline
    let deadline = t0() + Duration::days(37);
    svc.sweep(deadline - Duration::days(1)).unwrap();
    let (vault, _) = svc
        .check_in(id, CheckInRequest::new("sig"), deadline)
        .unwrap();
    assert_eq!(vault.status, VaultStatus::Active);

    let events = svc.sweep(deadline + Duration::seconds(1)).unwrap();
    assert!(events.is_empty());
    assert_eq!(
        svc.store().vault(id).unwrap().unwrap().status,
        VaultStatus::Active
    );
    assert_eq!(svc.store().check_ins(id).unwrap().len(), 1);
}

#[test]
fn test_attestation_quorum_then_claim() {
    let (_dir, svc) = setup();
    let created = svc.create_vault(&request(3), t0()).unwrap();
    let id = created.vault.id;
    accept_all(&svc, &created);

    let parties = svc.parties(id).unwrap();
    let guardian_ids: Vec<_> = parties
        .iter()
        .filter(|p| p.role == PartyRole::Guardian)
        .map(|p| p.id)
        .collect();
    let heir = parties
        .iter()
        .find(|p| p.role == PartyRole::Beneficiary)
        .unwrap();

    // Claim before trigger is refused
    let early = t0() + Duration::days(2);
    assert!(matches!(
        svc.claim(id, heir.id, early),
        Err(VaultError::InvalidState { .. })
    ));

    let (vault, _) = svc.attest(id, guardian_ids[0], early).unwrap();
    assert_eq!(vault.status, VaultStatus::Active);
    let (vault, events) = svc.attest(id, guardian_ids[1], early).unwrap();
    assert_eq!(vault.status, VaultStatus::Triggered);
    assert!(events.iter().any(|e| matches!(
        e,
        LifecycleEvent::Triggered {
            reason: TriggerReason::Attestation,
            ..
        }
    )));

    let (vault, _) = svc.claim(id, heir.id, early + Duration::hours(1)).unwrap();
    assert_eq!(vault.status, VaultStatus::Claimed);
    assert_eq!(vault.claimed_by, Some(heir.id));

    // Claimed is final
    let err = svc
        .check_in(id, CheckInRequest::new("sig"), early + Duration::hours(2))
        .unwrap_err();
    assert_eq!(err.code(), "VAULT_FINALIZED");
    assert!(svc.store().list_open_vaults().unwrap().is_empty());
}

#[test]
fn test_claimed_vault_rejects_every_mutation() {
    let (_dir, svc) = setup();
    let created = svc.create_vault(&request(3), t0()).unwrap();
    let id = created.vault.id;
    accept_all(&svc, &created);

    let triggered = t0() + Duration::days(38);
    svc.sweep(triggered).unwrap();
    let heir = created
        .parties
        .iter()
        .find(|p| p.role == PartyRole::Beneficiary)
        .unwrap();
    svc.claim(id, heir.id, triggered + Duration::hours(1)).unwrap();

    // A party from another vault and a missing signature are never
    // reported ahead of finality
    let other = svc.create_vault(&request(3), t0()).unwrap();
    let stranger = other.parties[0].id;
    let later = triggered + Duration::hours(2);

    let err = svc
        .check_in(id, CheckInRequest::new(""), later)
        .unwrap_err();
    assert_eq!(err.code(), "VAULT_FINALIZED");
    assert_eq!(svc.attest(id, stranger, later).unwrap_err().code(), "VAULT_FINALIZED");
    assert_eq!(svc.claim(id, stranger, later).unwrap_err().code(), "VAULT_FINALIZED");
    assert_eq!(svc.revoke(id, OWNER, later).unwrap_err().code(), "VAULT_FINALIZED");
    assert_eq!(
        svc.accept_invite(&created.parties[0].invite_token, later)
            .unwrap_err()
            .code(),
        "VAULT_FINALIZED"
    );

    let vault = svc.store().vault(id).unwrap().unwrap();
    assert_eq!(vault.status, VaultStatus::Claimed);
    assert!(svc.store().check_ins(id).unwrap().is_empty());
}

#[test]
fn test_owner_revokes_mistaken_trigger() {
    let (_dir, svc) = setup();
    let id = svc.create_vault(&request(3), t0()).unwrap().vault.id;

    let triggered = t0() + Duration::days(38);
    svc.sweep(triggered).unwrap();
    assert!(svc.can_revoke(id, triggered + Duration::hours(1)).unwrap());

    let (vault, _) = svc
        .revoke(id, "OWNER@example.com", triggered + Duration::hours(1))
        .unwrap();
    assert_eq!(vault.status, VaultStatus::Active);
    assert_eq!(vault.trigger_cycle, 1);
    assert!(vault.triggered_at.is_none());
}

// ============================================================================
// Creation and recovery
// ============================================================================

#[test]
fn test_three_guardians_any_two_recover() {
    let (_dir, svc) = setup();
    let created = svc.create_vault(&request(3), t0()).unwrap();
    assert_eq!(created.vault.fragment_scheme, Some(Scheme::TwoOfThree));

    let fragments = provided(&svc, &created);
    assert_eq!(fragments.len(), 3);

    for (a, b) in [(0, 1), (0, 2), (1, 2)] {
        let outcome = svc
            .recover(
                &RecoveryRequest {
                    fragments: vec![fragments[a].clone(), fragments[b].clone()],
                    vault_id: Some(created.vault.id),
                    scheme_hint: None,
                },
                t0(),
            )
            .unwrap();
        assert_eq!(outcome.secret, created.master_secret);
        assert_eq!(outcome.scheme, Scheme::TwoOfThree);
    }

    let err = svc
        .recover(
            &RecoveryRequest {
                fragments: vec![fragments[0].clone()],
                vault_id: Some(created.vault.id),
                scheme_hint: None,
            },
            t0(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        VaultError::InsufficientFragments {
            provided: 1,
            required: 2,
            ..
        }
    ));

    // Every attempt is recorded, failures included
    let attempts = svc.store().recovery_attempts().unwrap();
    assert_eq!(attempts.len(), 4);
    assert_eq!(attempts.iter().filter(|a| a.success).count(), 3);
    assert_eq!(
        attempts[3].error_type.as_deref(),
        Some("INSUFFICIENT_FRAGMENTS")
    );
}

#[test]
fn test_five_guardians_any_three_recover_same_secret() {
    let (_dir, svc) = setup();
    let created = svc.create_vault(&request(5), t0()).unwrap();
    assert_eq!(created.vault.fragment_scheme, Some(Scheme::ThreeOfFive));

    let fragments = provided(&svc, &created);
    for a in 0..5 {
        for b in (a + 1)..5 {
            for c in (b + 1)..5 {
                let outcome = svc
                    .recover(
                        &RecoveryRequest {
                            fragments: vec![
                                fragments[a].clone(),
                                fragments[b].clone(),
                                fragments[c].clone(),
                            ],
                            vault_id: Some(created.vault.id),
                            scheme_hint: None,
                        },
                        t0(),
                    )
                    .unwrap();
                assert_eq!(outcome.secret, created.master_secret);
            }
        }
    }
}

#[test]
fn test_single_guardian_recovers_with_owner_share() {
    let (_dir, svc) = setup();
    let created = svc.create_vault(&request(1), t0()).unwrap();
    assert_eq!(svc.fragments(created.vault.id).unwrap().len(), 1);
    assert_eq!(created.owner_shares.len(), 2);

    let mut fragments = provided(&svc, &created);
    fragments.push(ProvidedFragment::plain(created.owner_shares[0].share.as_str()));
    let outcome = svc
        .recover(
            &RecoveryRequest {
                fragments,
                vault_id: Some(created.vault.id),
                scheme_hint: None,
            },
            t0(),
        )
        .unwrap();
    assert_eq!(outcome.secret, created.master_secret);
}

#[test]
fn test_guardian_beneficiary_overlap_rejected() {
    let (_dir, svc) = setup();
    let mut req = request(3);
    req.beneficiaries
        .push(PartyInput::new("Also guardian", "Guardian1@Example.com"));

    let err = svc.create_vault(&req, t0()).unwrap_err();
    assert_eq!(err.code(), "GUARDIAN_BENEFICIARY_OVERLAP");
    assert!(svc.store().list_open_vaults().unwrap().is_empty());
}

#[test]
fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vigil.db");

    let created = {
        let svc = VaultService::new(Arc::new(SqliteStore::open(&path).unwrap()))
            .with_cipher(CipherParams::interactive());
        let created = svc.create_vault(&request(3), t0()).unwrap();
        svc.check_in(created.vault.id, CheckInRequest::new("sig"), t0() + Duration::days(3))
            .unwrap();
        created
    };

    let svc = VaultService::new(Arc::new(SqliteStore::open(&path).unwrap()));
    let vault = svc.store().vault(created.vault.id).unwrap().unwrap();
    assert_eq!(vault.next_check_in_due, t0() + Duration::days(33));
    assert_eq!(vault.version, 1);

    // Recovery resolves the scheme from the persisted vault
    let fragments = provided(&svc, &created);
    let outcome = svc
        .recover(
            &RecoveryRequest {
                fragments: fragments[1..].to_vec(),
                vault_id: Some(created.vault.id),
                scheme_hint: None,
            },
            t0(),
        )
        .unwrap();
    assert_eq!(outcome.secret, created.master_secret);
}
