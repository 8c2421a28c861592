//! Persistence and metrics collaborators.
//!
//! The core talks to storage only through [`VaultStore`] and
//! [`RecoveryMetrics`]. [`MemoryStore`] implements both for tests and
//! embedding; the server ships a SQLite implementation.

use crate::party::Party;
use crate::recovery::RecoveryAttempt;
use crate::vault::{CheckIn, Fragment, PartyId, Vault, VaultId, VaultStatus};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Everything written when a vault is created, persisted all-or-nothing
#[derive(Debug, Clone)]
pub struct NewVault {
    pub vault: Vault,
    pub parties: Vec<Party>,
    pub fragments: Vec<Fragment>,
}

pub trait VaultStore: Send + Sync {
    /// Persist a vault with its parties and fragments in one transaction
    fn create_vault(&self, record: NewVault) -> Result<(), StoreError>;

    fn vault(&self, id: VaultId) -> Result<Option<Vault>, StoreError>;

    /// Overwrite a vault if its stored version still equals
    /// `expected_version`. Returns the new version.
    fn update_vault(&self, vault: &Vault, expected_version: u64) -> Result<u64, StoreError>;

    fn parties(&self, vault_id: VaultId) -> Result<Vec<Party>, StoreError>;

    fn party_by_invite(&self, token: &str) -> Result<Option<Party>, StoreError>;

    fn update_party(&self, party: &Party) -> Result<(), StoreError>;

    fn fragments(&self, vault_id: VaultId) -> Result<Vec<Fragment>, StoreError>;

    fn append_check_in(&self, check_in: &CheckIn) -> Result<(), StoreError>;

    fn check_ins(&self, vault_id: VaultId) -> Result<Vec<CheckIn>, StoreError>;

    /// All vaults not yet claimed
    fn list_open_vaults(&self) -> Result<Vec<Vault>, StoreError>;

    /// Update the vault and append the check-in log entry together.
    ///
    /// Backends with transactions should override this.
    fn record_check_in(
        &self,
        vault: &Vault,
        expected_version: u64,
        check_in: &CheckIn,
    ) -> Result<u64, StoreError> {
        let version = self.update_vault(vault, expected_version)?;
        self.append_check_in(check_in)?;
        Ok(version)
    }
}

/// Audit sink for recovery attempts
pub trait RecoveryMetrics: Send + Sync {
    fn record(&self, attempt: &RecoveryAttempt) -> Result<(), StoreError>;
}

/// Discards recovery attempts
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl RecoveryMetrics for NoopMetrics {
    fn record(&self, _attempt: &RecoveryAttempt) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    vaults: HashMap<VaultId, Vault>,
    parties: HashMap<PartyId, Party>,
    fragments: HashMap<VaultId, Vec<Fragment>>,
    check_ins: HashMap<VaultId, Vec<CheckIn>>,
    attempts: Vec<RecoveryAttempt>,
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    /// Recorded recovery attempts, oldest first
    pub fn recovery_attempts(&self) -> Result<Vec<RecoveryAttempt>, StoreError> {
        Ok(self.lock()?.attempts.clone())
    }
}

impl VaultStore for MemoryStore {
    fn create_vault(&self, record: NewVault) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let id = record.vault.id;
        if state.vaults.contains_key(&id) {
            return Err(StoreError::Duplicate(format!("vault {id}")));
        }
        if let Some(p) = record
            .parties
            .iter()
            .find(|p| state.parties.contains_key(&p.id))
        {
            return Err(StoreError::Duplicate(format!("party {}", p.id)));
        }

        // All checks done; nothing below can fail
        state.vaults.insert(id, record.vault);
        for party in record.parties {
            state.parties.insert(party.id, party);
        }
        state.fragments.insert(id, record.fragments);
        Ok(())
    }

    fn vault(&self, id: VaultId) -> Result<Option<Vault>, StoreError> {
        Ok(self.lock()?.vaults.get(&id).cloned())
    }

    fn update_vault(&self, vault: &Vault, expected_version: u64) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let stored = state
            .vaults
            .get_mut(&vault.id)
            .ok_or_else(|| StoreError::NotFound(format!("vault {}", vault.id)))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                found: stored.version,
            });
        }
        let mut updated = vault.clone();
        updated.version = expected_version + 1;
        *stored = updated;
        Ok(expected_version + 1)
    }

    fn parties(&self, vault_id: VaultId) -> Result<Vec<Party>, StoreError> {
        Ok(self
            .lock()?
            .parties
            .values()
            .filter(|p| p.vault_id == vault_id)
            .cloned()
            .collect())
    }

    fn party_by_invite(&self, token: &str) -> Result<Option<Party>, StoreError> {
        Ok(self
            .lock()?
            .parties
            .values()
            .find(|p| p.invite_token == token)
            .cloned())
    }

    fn update_party(&self, party: &Party) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        match state.parties.get_mut(&party.id) {
            Some(stored) => {
                *stored = party.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("party {}", party.id))),
        }
    }

    fn fragments(&self, vault_id: VaultId) -> Result<Vec<Fragment>, StoreError> {
        let mut fragments = self
            .lock()?
            .fragments
            .get(&vault_id)
            .cloned()
            .unwrap_or_default();
        fragments.sort_by_key(|f| f.fragment_index);
        Ok(fragments)
    }

    fn append_check_in(&self, check_in: &CheckIn) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.vaults.contains_key(&check_in.vault_id) {
            return Err(StoreError::NotFound(format!("vault {}", check_in.vault_id)));
        }
        state
            .check_ins
            .entry(check_in.vault_id)
            .or_default()
            .push(check_in.clone());
        Ok(())
    }

    fn check_ins(&self, vault_id: VaultId) -> Result<Vec<CheckIn>, StoreError> {
        Ok(self
            .lock()?
            .check_ins
            .get(&vault_id)
            .cloned()
            .unwrap_or_default())
    }

    fn list_open_vaults(&self) -> Result<Vec<Vault>, StoreError> {
        let mut vaults: Vec<Vault> = self
            .lock()?
            .vaults
            .values()
            .filter(|v| v.status != VaultStatus::Claimed)
            .cloned()
            .collect();
        vaults.sort_by_key(|v| v.created_at);
        Ok(vaults)
    }
}

impl RecoveryMetrics for MemoryStore {
    fn record(&self, attempt: &RecoveryAttempt) -> Result<(), StoreError> {
        self.lock()?.attempts.push(attempt.clone());
        Ok(())
    }
}
