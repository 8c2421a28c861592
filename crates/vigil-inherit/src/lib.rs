//! Vigil Inheritance Module
//!
//! Dead-man's-switch vaults: an owner checks in on a schedule; if they stop,
//! the vault is triggered and beneficiaries may claim it. The master secret
//! is split among guardians, each holding one encrypted fragment.
//!
//! # Concepts
//!
//! - **Check-in**: verified owner liveness proof that restarts the clock
//! - **Grace period**: time after a missed check-in before triggering
//! - **Attestation**: guardians (or attestors) confirming death or
//!   incapacity; a quorum triggers early
//! - **Revoke**: owner reclaims a triggered vault within a short window
//!
//! # Lifecycle
//!
//! ```text
//! Active --(due passed)--> Warning --(grace passed | quorum)--> Triggered --(claim)--> Claimed
//!    ^                        |                                      |
//!    +------(check-in)--------+                                      |
//!    +------------------(revoke within window)-----------------------+
//! ```
//!
//! Status is computed from timestamps by [`lifecycle::evaluate`]; an
//! external sweep ([`VaultService::sweep`]) persists transitions.

pub mod checkin;
pub mod create;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod party;
pub mod policy;
pub mod recovery;
pub mod service;
pub mod store;
pub mod vault;

pub use checkin::{CheckInRequest, LivenessVerifier, RequireSignature};
pub use create::{prepare_vault, CreateVaultRequest, CreatedVault, GuardianPassphrase, OwnerShare};
pub use error::{ErrorKind, VaultError};
pub use events::{LifecycleEvent, TriggerReason};
pub use party::{Party, PartyInput, PartyRole, PartyStatus};
pub use policy::{AttestationRoles, LifecyclePolicy, PolicyError, Scheme, TierLimits};
pub use recovery::{
    ProvidedFragment, RecoveryAttempt, RecoveryCoordinator, RecoveryOutcome, RecoveryRequest,
};
pub use service::VaultService;
pub use store::{MemoryStore, NewVault, NoopMetrics, RecoveryMetrics, StoreError, VaultStore};
pub use vault::{CheckIn, Fragment, PartyId, Vault, VaultId, VaultStatus};
