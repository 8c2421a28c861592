//! Vault service: lifecycle operations against a store.
//!
//! Mutations on one vault are serialized through a per-vault lock, and every
//! write carries the version it was read at, so a writer in another process
//! fails with a version conflict instead of overwriting.

use crate::checkin::{CheckInRequest, LivenessVerifier, RequireSignature};
use crate::create::{prepare_vault, CreateVaultRequest, CreatedVault};
use crate::error::VaultError;
use crate::events::LifecycleEvent;
use crate::lifecycle;
use crate::party::{Party, PartyRegistry};
use crate::policy::{LifecyclePolicy, TierLimits};
use crate::recovery::{RecoveryCoordinator, RecoveryOutcome, RecoveryRequest};
use crate::store::{RecoveryMetrics, StoreError, VaultStore};
use crate::vault::{Fragment, PartyId, Vault, VaultId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use vigil_core::CipherParams;

fn poisoned() -> VaultError {
    VaultError::Storage(StoreError::Backend("vault lock poisoned".into()))
}

pub struct VaultService<S> {
    store: Arc<S>,
    verifier: Arc<dyn LivenessVerifier>,
    lifecycle: LifecyclePolicy,
    limits: TierLimits,
    cipher: CipherParams,
    locks: Mutex<HashMap<VaultId, Arc<Mutex<()>>>>,
}

impl<S: VaultStore + RecoveryMetrics> VaultService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            verifier: Arc::new(RequireSignature),
            lifecycle: LifecyclePolicy::default(),
            limits: TierLimits::default(),
            cipher: CipherParams::default(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn LivenessVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: LifecyclePolicy) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_limits(mut self, limits: TierLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_cipher(mut self, cipher: CipherParams) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn lifecycle_policy(&self) -> &LifecyclePolicy {
        &self.lifecycle
    }

    /// Run `f` holding the vault's lock
    ///
    /// Registry entries live only while some caller holds or waits on them,
    /// so the map never outgrows the number of in-flight operations.
    fn locked<T, F>(&self, id: VaultId, f: F) -> Result<T, VaultError>
    where
        F: FnOnce() -> Result<T, VaultError>,
    {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| poisoned())?;
            Arc::clone(locks.entry(id).or_default())
        };
        let result = match lock.lock() {
            Ok(_guard) => f(),
            Err(_) => Err(poisoned()),
        };
        self.release(id, lock);
        result
    }

    fn release(&self, id: VaultId, lock: Arc<Mutex<()>>) {
        // Clones are only handed out under the registry lock, so a count of
        // one seen here cannot race with a new holder.
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        drop(lock);
        if locks.get(&id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&id);
        }
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or_default()
    }

    fn load(&self, id: VaultId) -> Result<(Vault, PartyRegistry), VaultError> {
        let vault = self.store.vault(id)?.ok_or(VaultError::VaultNotFound(id))?;
        let parties = PartyRegistry::new(self.store.parties(id)?);
        Ok((vault, parties))
    }

    fn quorum(&self, parties: &PartyRegistry) -> usize {
        lifecycle::effective_quorum(&self.lifecycle, parties)
    }

    /// Load, transform and persist one vault under its lock
    ///
    /// A claimed vault fails with `VaultFinalized` before `f` runs. Nothing is
    /// written if `f` fails or leaves the vault unchanged.
    fn apply<F>(&self, id: VaultId, f: F) -> Result<(Vault, Vec<LifecycleEvent>), VaultError>
    where
        F: FnOnce(&mut Vault, &PartyRegistry, usize) -> Result<Vec<LifecycleEvent>, VaultError>,
    {
        self.locked(id, || {
            let (original, parties) = self.load(id)?;
            lifecycle::ensure_not_finalized(&original)?;

            let mut vault = original.clone();
            let events = f(&mut vault, &parties, self.quorum(&parties))?;

            if vault != original {
                vault.version = self.store.update_vault(&vault, original.version)?;
            }
            Ok((vault, events))
        })
    }

    fn party(parties: &PartyRegistry, party_id: PartyId) -> Result<&Party, VaultError> {
        parties.get(party_id).ok_or(VaultError::PartyNotFound)
    }

    /// Create and persist a vault
    ///
    /// Returns the master secret and guardian passphrases; they are not
    /// stored and cannot be retrieved again.
    pub fn create_vault(
        &self,
        request: &CreateVaultRequest,
        now: DateTime<Utc>,
    ) -> Result<CreatedVault, VaultError> {
        let (record, created) =
            prepare_vault(request, now, &self.limits, &self.lifecycle, &self.cipher)?;
        self.store.create_vault(record)?;
        log::info!("Created vault {} for {}", created.vault.id, created.vault.owner);
        Ok(created)
    }

    /// The vault as it stands at `now`, without persisting any change
    pub fn vault_at(&self, id: VaultId, now: DateTime<Utc>) -> Result<Vault, VaultError> {
        let (mut vault, parties) = self.load(id)?;
        lifecycle::refresh(&mut vault, now, self.quorum(&parties));
        Ok(vault)
    }

    pub fn fragments(&self, id: VaultId) -> Result<Vec<Fragment>, VaultError> {
        Ok(self.store.fragments(id)?)
    }

    pub fn parties(&self, id: VaultId) -> Result<Vec<Party>, VaultError> {
        Ok(self.store.parties(id)?)
    }

    /// Owner check-in: verify liveness, restart the clock, log the check-in
    pub fn check_in(
        &self,
        id: VaultId,
        request: CheckInRequest,
        now: DateTime<Utc>,
    ) -> Result<(Vault, Vec<LifecycleEvent>), VaultError> {
        self.locked(id, || {
            let (mut vault, parties) = self.load(id)?;
            lifecycle::ensure_not_finalized(&vault)?;
            if !self
                .verifier
                .verify(&vault, &request.signature, request.message.as_deref())
            {
                return Err(VaultError::InvalidSignature);
            }

            let expected = vault.version;
            let events = lifecycle::check_in(&mut vault, now, self.quorum(&parties))?;
            let record = request.into_record(&vault, now);
            vault.version = self.store.record_check_in(&vault, expected, &record)?;

            log::info!(
                "Vault {} checked in; next due {}",
                vault.id,
                vault.next_check_in_due
            );
            Ok((vault, events))
        })
    }

    pub fn attest(
        &self,
        id: VaultId,
        party_id: PartyId,
        now: DateTime<Utc>,
    ) -> Result<(Vault, Vec<LifecycleEvent>), VaultError> {
        let policy = &self.lifecycle;
        self.apply(id, |vault, parties, quorum| {
            let party = Self::party(parties, party_id)?;
            lifecycle::attest(vault, party, now, quorum, policy)
        })
    }

    pub fn claim(
        &self,
        id: VaultId,
        party_id: PartyId,
        now: DateTime<Utc>,
    ) -> Result<(Vault, Vec<LifecycleEvent>), VaultError> {
        let (vault, events) = self.apply(id, |vault, parties, quorum| {
            let party = Self::party(parties, party_id)?;
            lifecycle::claim(vault, party, now, quorum)
        })?;
        log::info!("Vault {} claimed by party {}", vault.id, party_id);
        Ok((vault, events))
    }

    pub fn revoke(
        &self,
        id: VaultId,
        requester: &str,
        now: DateTime<Utc>,
    ) -> Result<(Vault, Vec<LifecycleEvent>), VaultError> {
        let policy = &self.lifecycle;
        self.apply(id, |vault, _parties, quorum| {
            lifecycle::revoke(vault, requester, now, quorum, policy)
        })
    }

    pub fn can_revoke(&self, id: VaultId, now: DateTime<Utc>) -> Result<bool, VaultError> {
        let (vault, parties) = self.load(id)?;
        Ok(lifecycle::can_revoke(
            &vault,
            now,
            self.quorum(&parties),
            &self.lifecycle,
        ))
    }

    /// Accept an invitation by token
    pub fn accept_invite(&self, token: &str, now: DateTime<Utc>) -> Result<Party, VaultError> {
        let found = self
            .store
            .party_by_invite(token)?
            .ok_or(VaultError::PartyNotFound)?;

        self.locked(found.vault_id, || {
            let vault = self
                .store
                .vault(found.vault_id)?
                .ok_or(VaultError::VaultNotFound(found.vault_id))?;
            lifecycle::ensure_not_finalized(&vault)?;

            // Re-read under the lock
            let mut party = self
                .store
                .party_by_invite(token)?
                .ok_or(VaultError::PartyNotFound)?;
            if party.accept(now)? {
                self.store.update_party(&party)?;
                log::info!(
                    "Party {} accepted {} invitation for vault {}",
                    party.id,
                    party.role.as_str(),
                    party.vault_id
                );
            }
            Ok(party)
        })
    }

    /// Re-evaluate every open vault at `now` and persist status changes
    ///
    /// A vault that fails to update (for example on a version conflict with
    /// another writer) is skipped and picked up by the next sweep.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<LifecycleEvent>, VaultError> {
        let vaults = self.store.list_open_vaults()?;
        let mut events = Vec::new();

        for listed in vaults {
            match self.apply(listed.id, |vault, _parties, quorum| {
                Ok(lifecycle::refresh(vault, now, quorum))
            }) {
                Ok((_, changed)) => events.extend(changed),
                Err(e) => log::warn!("Sweep skipped vault {}: {}", listed.id, e),
            }
        }

        log::debug!("Sweep at {} produced {} events", now, events.len());
        Ok(events)
    }

    /// Reconstruct a master secret; never changes vault state
    pub fn recover(
        &self,
        request: &RecoveryRequest,
        now: DateTime<Utc>,
    ) -> Result<RecoveryOutcome, VaultError> {
        let store: &S = &self.store;
        RecoveryCoordinator::with_store(store, store).recover(request, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::party::{PartyInput, PartyRole, PartyStatus};
    use crate::recovery::ProvidedFragment;
    use crate::store::MemoryStore;
    use crate::vault::VaultStatus;
    use chrono::{Duration, TimeZone};
    use std::thread;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap()
    }

    fn service() -> VaultService<MemoryStore> {
        VaultService::new(Arc::new(MemoryStore::new())).with_cipher(CipherParams::interactive())
    }

    fn request() -> CreateVaultRequest {
        CreateVaultRequest {
            owner: "owner@example.com".into(),
            check_in_interval_days: 30,
            grace_period_days: 7,
            guardians: vec![
                PartyInput::new("Ann", "ann@example.com"),
                PartyInput::new("Ben", "ben@example.com"),
                PartyInput::new("Cat", "cat@example.com"),
            ],
            beneficiaries: vec![PartyInput::new("Dee", "dee@example.com")],
            attestors: vec![],
        }
    }

    fn accept_all(svc: &VaultService<MemoryStore>, created: &CreatedVault) {
        for party in &created.parties {
            svc.accept_invite(&party.invite_token, t0()).unwrap();
        }
    }

    fn with_role(created: &CreatedVault, role: PartyRole) -> Vec<PartyId> {
        created
            .parties
            .iter()
            .filter(|p| p.role == role)
            .map(|p| p.id)
            .collect()
    }

    #[test]
    fn test_create_persists_everything() {
        let svc = service();
        let created = svc.create_vault(&request(), t0()).unwrap();
        let id = created.vault.id;

        assert_eq!(svc.fragments(id).unwrap().len(), 3);
        assert_eq!(svc.parties(id).unwrap().len(), 4);
        assert_eq!(svc.vault_at(id, t0()).unwrap().status, VaultStatus::Active);
    }

    #[test]
    fn test_rejected_request_persists_nothing() {
        let svc = service();
        let mut req = request();
        req.beneficiaries.push(PartyInput::new("Ann", "ann@example.com"));
        let err = svc.create_vault(&req, t0()).unwrap_err();
        assert_eq!(err.code(), "GUARDIAN_BENEFICIARY_OVERLAP");
        assert!(svc.store().list_open_vaults().unwrap().is_empty());
    }

    #[test]
    fn test_check_in_logs_and_bumps_version() {
        let svc = service();
        let created = svc.create_vault(&request(), t0()).unwrap();
        let id = created.vault.id;

        let now = t0() + Duration::days(20);
        let (vault, events) = svc.check_in(id, CheckInRequest::new("sig"), now).unwrap();
        assert_eq!(vault.version, 1);
        assert_eq!(vault.next_check_in_due, now + Duration::days(30));
        assert_eq!(events.len(), 1);
        assert_eq!(svc.store().check_ins(id).unwrap().len(), 1);
    }

    #[test]
    fn test_check_in_requires_signature() {
        let svc = service();
        let created = svc.create_vault(&request(), t0()).unwrap();
        let err = svc
            .check_in(created.vault.id, CheckInRequest::new(""), t0())
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_SIGNATURE");
        assert!(svc.store().check_ins(created.vault.id).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_vault() {
        let svc = service();
        let err = svc
            .check_in(uuid::Uuid::new_v4(), CheckInRequest::new("sig"), t0())
            .unwrap_err();
        assert_eq!(err.code(), "VAULT_NOT_FOUND");
    }

    #[test]
    fn test_pending_guardian_cannot_attest() {
        let svc = service();
        let created = svc.create_vault(&request(), t0()).unwrap();
        let guardian = with_role(&created, PartyRole::Guardian)[0];
        let err = svc.attest(created.vault.id, guardian, t0()).unwrap_err();
        assert_eq!(err.code(), "ROLE_NOT_PERMITTED");
    }

    #[test]
    fn test_pending_guardians_hold_quorum_until_they_accept() {
        let svc = service();
        let created = svc.create_vault(&request(), t0()).unwrap();
        let id = created.vault.id;
        let guardians = with_role(&created, PartyRole::Guardian);
        svc.accept_invite(&created.parties[0].invite_token, t0()).unwrap();

        // A lone early acceptor never triggers the vault
        let now = t0() + Duration::days(1);
        let (vault, _) = svc.attest(id, guardians[0], now).unwrap();
        assert_eq!(vault.status, VaultStatus::Active);

        svc.accept_invite(&created.parties[1].invite_token, now).unwrap();
        let (vault, _) = svc.attest(id, guardians[1], now).unwrap();
        assert_eq!(vault.status, VaultStatus::Triggered);
    }

    #[test]
    fn test_attest_claim_flow() {
        let svc = service();
        let created = svc.create_vault(&request(), t0()).unwrap();
        accept_all(&svc, &created);
        let id = created.vault.id;
        let guardians = with_role(&created, PartyRole::Guardian);
        let heir = with_role(&created, PartyRole::Beneficiary)[0];

        let now = t0() + Duration::days(3);
        svc.attest(id, guardians[0], now).unwrap();
        let (_, repeat) = svc.attest(id, guardians[0], now).unwrap();
        assert!(repeat.is_empty());

        let (vault, _) = svc.attest(id, guardians[1], now).unwrap();
        assert_eq!(vault.status, VaultStatus::Triggered);

        let (vault, _) = svc.claim(id, heir, now + Duration::hours(1)).unwrap();
        assert_eq!(vault.status, VaultStatus::Claimed);

        let err = svc.check_in(id, CheckInRequest::new("sig"), now).unwrap_err();
        assert_eq!(err.code(), "VAULT_FINALIZED");
    }

    #[test]
    fn test_claimed_vault_is_final_before_other_checks() {
        let svc = service();
        let created = svc.create_vault(&request(), t0()).unwrap();
        let id = created.vault.id;
        let guardians = with_role(&created, PartyRole::Guardian);
        let heir = with_role(&created, PartyRole::Beneficiary)[0];
        // Third guardian never accepts
        for party in created.parties.iter().filter(|p| p.id != guardians[2]) {
            svc.accept_invite(&party.invite_token, t0()).unwrap();
        }

        let now = t0() + Duration::days(3);
        svc.attest(id, guardians[0], now).unwrap();
        svc.attest(id, guardians[1], now).unwrap();
        svc.claim(id, heir, now).unwrap();

        let stranger = svc.create_vault(&request(), t0()).unwrap().parties[0].id;
        let later = now + Duration::hours(1);
        let errors = [
            svc.check_in(id, CheckInRequest::new(""), later).unwrap_err(),
            svc.attest(id, stranger, later).unwrap_err(),
            svc.attest(id, guardians[2], later).unwrap_err(),
            svc.claim(id, stranger, later).unwrap_err(),
            svc.revoke(id, "dee@example.com", later).unwrap_err(),
            svc.accept_invite(&created.parties[2].invite_token, later).unwrap_err(),
        ];
        for err in errors {
            assert_eq!(err.code(), "VAULT_FINALIZED");
        }

        let parties = svc.parties(id).unwrap();
        let pending = parties.iter().find(|p| p.id == guardians[2]).unwrap();
        assert_eq!(pending.status, PartyStatus::Pending);
        let vault = svc.store().vault(id).unwrap().unwrap();
        assert_eq!(vault.status, VaultStatus::Claimed);
        assert_eq!(vault.claimed_by, Some(heir));
    }

    #[test]
    fn test_lock_registry_only_holds_in_flight_vaults() {
        let svc = service();
        for _ in 0..1000 {
            let err = svc
                .check_in(uuid::Uuid::new_v4(), CheckInRequest::new("sig"), t0())
                .unwrap_err();
            assert_eq!(err.code(), "VAULT_NOT_FOUND");
        }
        assert_eq!(svc.lock_entries(), 0);

        let created = svc.create_vault(&request(), t0()).unwrap();
        accept_all(&svc, &created);
        svc.check_in(created.vault.id, CheckInRequest::new("sig"), t0())
            .unwrap();
        svc.check_in(created.vault.id, CheckInRequest::new(""), t0())
            .unwrap_err();
        svc.sweep(t0() + Duration::days(60)).unwrap();
        assert_eq!(svc.lock_entries(), 0);
    }

    #[test]
    fn test_revoke_after_attestation_trigger() {
        let svc = service();
        let created = svc.create_vault(&request(), t0()).unwrap();
        accept_all(&svc, &created);
        let id = created.vault.id;
        let guardians = with_role(&created, PartyRole::Guardian);

        let now = t0() + Duration::days(3);
        svc.attest(id, guardians[0], now).unwrap();
        svc.attest(id, guardians[1], now).unwrap();
        assert!(svc.can_revoke(id, now + Duration::hours(1)).unwrap());

        let err = svc.revoke(id, "dee@example.com", now).unwrap_err();
        assert_eq!(err.code(), "NOT_OWNER");

        let (vault, _) = svc.revoke(id, "owner@example.com", now + Duration::hours(1)).unwrap();
        assert_eq!(vault.status, VaultStatus::Active);
        assert!(vault.attestations.is_empty());
    }

    #[test]
    fn test_accept_invite_paths() {
        let svc = service();
        let created = svc.create_vault(&request(), t0()).unwrap();
        let token = created.parties[0].invite_token.clone();

        let party = svc.accept_invite(&token, t0() + Duration::days(1)).unwrap();
        assert_eq!(party.status, PartyStatus::Accepted);
        // idempotent
        assert!(svc.accept_invite(&token, t0() + Duration::days(2)).is_ok());

        let late = created.parties[1].invite_token.clone();
        let err = svc.accept_invite(&late, t0() + Duration::days(15)).unwrap_err();
        assert_eq!(err.code(), "INVITE_EXPIRED");

        let err = svc.accept_invite("unknown", t0()).unwrap_err();
        assert_eq!(err.code(), "PARTY_NOT_FOUND");
    }

    #[test]
    fn test_sweep_persists_transitions() {
        let svc = service();
        let a = svc.create_vault(&request(), t0()).unwrap().vault.id;
        let b = svc.create_vault(&request(), t0() + Duration::days(5)).unwrap().vault.id;

        let events = svc.sweep(t0() + Duration::days(38)).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| e.vault_id() == a && e.label() == "triggered"));
        assert!(events.iter().any(|e| e.vault_id() == b && e.label() == "entered_warning"));

        let stored = svc.store().vault(a).unwrap().unwrap();
        assert_eq!(stored.status, VaultStatus::Triggered);

        // Nothing new on a second pass
        assert!(svc.sweep(t0() + Duration::days(38)).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_check_ins_serialize() {
        let svc = Arc::new(service());
        let id = svc.create_vault(&request(), t0()).unwrap().vault.id;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let svc = Arc::clone(&svc);
                thread::spawn(move || {
                    svc.check_in(id, CheckInRequest::new("sig"), t0() + Duration::days(i))
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }

        let vault = svc.store().vault(id).unwrap().unwrap();
        assert_eq!(vault.version, 8);
        assert_eq!(svc.store().check_ins(id).unwrap().len(), 8);
        assert_eq!(svc.lock_entries(), 0);
    }

    #[test]
    fn test_recover_uses_recorded_scheme() {
        let svc = service();
        let created = svc.create_vault(&request(), t0()).unwrap();
        let id = created.vault.id;
        let fragments = svc.fragments(id).unwrap();

        let request = RecoveryRequest {
            fragments: vec![
                ProvidedFragment::encrypted(
                    fragments[2].encrypted_data.clone(),
                    created.passphrases[2].passphrase.as_str(),
                ),
                ProvidedFragment::encrypted(
                    fragments[0].encrypted_data.clone(),
                    created.passphrases[0].passphrase.as_str(),
                ),
            ],
            vault_id: Some(id),
            scheme_hint: None,
        };
        let outcome = svc.recover(&request, t0()).unwrap();
        assert_eq!(outcome.secret.as_bytes(), created.master_secret.as_bytes());
        assert_eq!(svc.store().recovery_attempts().unwrap().len(), 1);

        // Recovery leaves the vault untouched
        assert_eq!(svc.store().vault(id).unwrap().unwrap().version, 0);
    }
}
