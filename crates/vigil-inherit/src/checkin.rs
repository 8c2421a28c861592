//! Owner check-ins and liveness verification.

use crate::vault::{CheckIn, Vault};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Verifies that a check-in really comes from the vault owner
///
/// Wallet or device signature checks live behind this trait, outside the
/// core.
pub trait LivenessVerifier: Send + Sync {
    fn verify(&self, vault: &Vault, signature: &str, message: Option<&str>) -> bool;
}

/// Accepts any non-empty signature
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireSignature;

impl LivenessVerifier for RequireSignature {
    fn verify(&self, _vault: &Vault, signature: &str, _message: Option<&str>) -> bool {
        !signature.trim().is_empty()
    }
}

/// A check-in as submitted by the owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInRequest {
    pub signature: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

impl CheckInRequest {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            message: None,
            ip_address: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Log record for this check-in
    pub fn into_record(self, vault: &Vault, now: DateTime<Utc>) -> CheckIn {
        CheckIn {
            vault_id: vault.id,
            signature: self.signature,
            message: self.message,
            ip_address: self.ip_address,
            checked_in_at: now,
        }
    }
}
