//! Error taxonomy for vault operations.
//!
//! Every error carries a kind (for callers that branch on category) and a
//! stable string code (for logs, metrics and API responses).

use crate::policy::{PolicyError, Scheme};
use crate::store::StoreError;
use crate::vault::{VaultId, VaultStatus};
use thiserror::Error;
use vigil_core::{CryptoError, PassphraseError};
use vigil_shamir::ShamirError;

/// Broad error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input from the caller
    Validation,
    /// Too few fragments or shares
    Quorum,
    /// Fragments or ciphertexts that fail authentication or consistency
    Integrity,
    /// Operation not allowed in the vault's current state
    State,
    /// Caller's role or tier forbids the operation
    Policy,
    /// Persistence failure
    Storage,
}

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Liveness signature rejected")]
    InvalidSignature,

    #[error("Vault not found: {0}")]
    VaultNotFound(VaultId),

    #[error("Party not found")]
    PartyNotFound,

    #[error("Not enough fragments for {scheme}: {provided} supplied, {required} required")]
    InsufficientFragments {
        scheme: Scheme,
        provided: usize,
        required: usize,
    },

    #[error("Not enough shares: {provided} supplied, {required} required")]
    InsufficientShares { provided: usize, required: usize },

    #[error("Invalid fragment: {0}")]
    InvalidFragments(String),

    #[error("Fragment authentication failed")]
    AuthenticationFailure,

    #[error("Fragments do not lie on a single polynomial")]
    InconsistentFragments,

    #[error("Reconstruction failed: {0}")]
    ReconstructionFailed(String),

    #[error("Cannot {action} while vault is {status}")]
    InvalidState {
        status: VaultStatus,
        action: &'static str,
    },

    #[error("Vault has been claimed and is final")]
    VaultFinalized,

    #[error("Emergency revoke window has closed")]
    RevokeWindowClosed,

    #[error("Invitation has expired")]
    InviteExpired,

    #[error("Invitation was revoked by the vault owner")]
    InviteRevoked,

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("Cryptographic failure: {0}")]
    Crypto(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Validation(_)
            | VaultError::InvalidSignature
            | VaultError::VaultNotFound(_)
            | VaultError::PartyNotFound => ErrorKind::Validation,
            VaultError::InsufficientFragments { .. } | VaultError::InsufficientShares { .. } => {
                ErrorKind::Quorum
            }
            VaultError::InvalidFragments(_)
            | VaultError::AuthenticationFailure
            | VaultError::InconsistentFragments
            | VaultError::ReconstructionFailed(_)
            | VaultError::Crypto(_) => ErrorKind::Integrity,
            VaultError::InvalidState { .. }
            | VaultError::VaultFinalized
            | VaultError::RevokeWindowClosed
            | VaultError::InviteExpired
            | VaultError::InviteRevoked => ErrorKind::State,
            VaultError::Policy(_) => ErrorKind::Policy,
            VaultError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::Validation(_) => "VALIDATION_ERROR",
            VaultError::InvalidSignature => "INVALID_SIGNATURE",
            VaultError::VaultNotFound(_) => "VAULT_NOT_FOUND",
            VaultError::PartyNotFound => "PARTY_NOT_FOUND",
            VaultError::InsufficientFragments { .. } => "INSUFFICIENT_FRAGMENTS",
            VaultError::InsufficientShares { .. } => "INSUFFICIENT_SHARES",
            VaultError::InvalidFragments(_) => "INVALID_FRAGMENTS",
            VaultError::AuthenticationFailure => "AUTHENTICATION_FAILURE",
            VaultError::InconsistentFragments => "INCONSISTENT_FRAGMENTS",
            VaultError::ReconstructionFailed(_) => "RECONSTRUCTION_FAILED",
            VaultError::InvalidState { .. } => "INVALID_STATE",
            VaultError::VaultFinalized => "VAULT_FINALIZED",
            VaultError::RevokeWindowClosed => "REVOKE_WINDOW_CLOSED",
            VaultError::InviteExpired => "INVITE_EXPIRED",
            VaultError::InviteRevoked => "INVITE_REVOKED",
            VaultError::Policy(e) => e.code(),
            VaultError::Crypto(_) => "CRYPTO_ERROR",
            VaultError::Storage(StoreError::VersionConflict { .. }) => "VERSION_CONFLICT",
            VaultError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<ShamirError> for VaultError {
    fn from(e: ShamirError) -> Self {
        match e {
            ShamirError::InsufficientShares { provided, required } => {
                VaultError::InsufficientShares { provided, required }
            }
            ShamirError::InvalidShare(msg) => VaultError::InvalidFragments(msg),
            ShamirError::Inconsistent => VaultError::InconsistentFragments,
            other => VaultError::ReconstructionFailed(other.to_string()),
        }
    }
}

impl From<CryptoError> for VaultError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::AuthenticationFailure => VaultError::AuthenticationFailure,
            CryptoError::InvalidFormat(msg) => VaultError::InvalidFragments(msg),
            other => VaultError::Crypto(other.to_string()),
        }
    }
}

impl From<PassphraseError> for VaultError {
    fn from(e: PassphraseError) -> Self {
        match e {
            PassphraseError::EmptyIdentity => {
                VaultError::Validation("guardian identity is empty".into())
            }
            other => VaultError::Crypto(other.to_string()),
        }
    }
}
