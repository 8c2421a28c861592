//! Secret recovery from guardian fragments
//!
//! Resolves the threshold scheme, decrypts any encrypted fragments,
//! cross-checks extra fragments against the reconstruction polynomial and
//! combines the first `threshold` shares. Every attempt is recorded to the
//! metrics sink on a best-effort basis. Recovery never mutates vault state.

use crate::error::VaultError;
use crate::policy::Scheme;
use crate::store::{RecoveryMetrics, VaultStore};
use crate::vault::VaultId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use vigil_core::{open_envelope, EncryptedFragment, MasterSecret};
use vigil_shamir::{combine_shares, verify_shares, Share};
use zeroize::Zeroizing;

/// A fragment as supplied by a guardian
///
/// Either a plain share string, or a fragment envelope with the
/// guardian's passphrase.
#[derive(Clone)]
pub struct ProvidedFragment {
    pub data: String,
    pub passphrase: Option<Zeroizing<String>>,
}

impl ProvidedFragment {
    pub fn plain(share: impl Into<String>) -> Self {
        Self {
            data: share.into(),
            passphrase: None,
        }
    }

    pub fn encrypted(envelope: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self {
            data: envelope.into(),
            passphrase: Some(Zeroizing::new(passphrase.into())),
        }
    }

    /// Decode to a share, decrypting first if this is an envelope
    fn decode(&self) -> Result<Share, VaultError> {
        let data = self.data.trim();
        if EncryptedFragment::looks_like_envelope(data) {
            let passphrase = self.passphrase.as_ref().ok_or_else(|| {
                VaultError::InvalidFragments("encrypted fragment supplied without passphrase".into())
            })?;
            let plain = open_envelope(data, passphrase)?;
            let text = std::str::from_utf8(&plain)
                .map_err(|_| VaultError::InvalidFragments("fragment payload is not text".into()))?;
            Ok(Share::from_hex(text)?)
        } else {
            Ok(Share::from_hex(data)?)
        }
    }
}

impl fmt::Debug for ProvidedFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvidedFragment")
            .field("len", &self.data.len())
            .field("encrypted", &self.passphrase.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecoveryRequest {
    pub fragments: Vec<ProvidedFragment>,
    pub vault_id: Option<VaultId>,
    pub scheme_hint: Option<Scheme>,
}

/// Where the scheme used for a recovery came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeSource {
    /// Recorded on the vault at creation
    Recorded,
    /// Inferred from the vault's persisted fragment count
    FragmentCount,
    /// Supplied by the caller
    Hint,
    Default,
}

#[derive(Debug)]
pub struct RecoveryOutcome {
    pub secret: MasterSecret,
    pub scheme: Scheme,
    pub scheme_source: SchemeSource,
    /// Fragments used for reconstruction (the threshold)
    pub fragments_used: usize,
    /// Fragments supplied, including cross-checked extras
    pub fragments_provided: usize,
}

/// Audit record of one recovery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub vault_id: Option<VaultId>,
    pub scheme: Scheme,
    pub fragments_provided: usize,
    pub threshold: u8,
    pub success: bool,
    pub error_type: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

pub struct RecoveryCoordinator<'a> {
    store: Option<&'a dyn VaultStore>,
    metrics: &'a dyn RecoveryMetrics,
}

impl<'a> RecoveryCoordinator<'a> {
    /// Coordinator with no vault context; relies on hints
    pub fn new(metrics: &'a dyn RecoveryMetrics) -> Self {
        Self {
            store: None,
            metrics,
        }
    }

    /// Coordinator that can look up a vault's recorded scheme
    pub fn with_store(store: &'a dyn VaultStore, metrics: &'a dyn RecoveryMetrics) -> Self {
        Self {
            store: Some(store),
            metrics,
        }
    }

    /// Determine the scheme: recorded on the vault, else inferred from the
    /// persisted fragment count, else the hint, else 2-of-3.
    pub fn resolve_scheme(
        &self,
        vault_id: Option<VaultId>,
        hint: Option<Scheme>,
    ) -> (Scheme, SchemeSource) {
        if let (Some(store), Some(id)) = (self.store, vault_id) {
            match store.vault(id) {
                Ok(Some(vault)) => {
                    if let Some(scheme) = vault.fragment_scheme {
                        return (scheme, SchemeSource::Recorded);
                    }
                }
                Ok(None) => log::debug!("Recovery for unknown vault {id}"),
                Err(e) => log::warn!("Could not load vault {id} for recovery: {e}"),
            }
            match store.fragments(id) {
                Ok(fragments) if !fragments.is_empty() => {
                    return (
                        Scheme::infer_from_fragment_count(fragments.len()),
                        SchemeSource::FragmentCount,
                    );
                }
                Ok(_) => {}
                Err(e) => log::warn!("Could not count fragments for vault {id}: {e}"),
            }
        }
        match hint {
            Some(scheme) => (scheme, SchemeSource::Hint),
            None => (Scheme::default(), SchemeSource::Default),
        }
    }

    /// Reconstruct the master secret from guardian fragments
    pub fn recover(
        &self,
        request: &RecoveryRequest,
        now: DateTime<Utc>,
    ) -> Result<RecoveryOutcome, VaultError> {
        let (scheme, source) = self.resolve_scheme(request.vault_id, request.scheme_hint);
        let result = self.reconstruct(request, scheme, source);

        let attempt = RecoveryAttempt {
            vault_id: request.vault_id,
            scheme,
            fragments_provided: request.fragments.len(),
            threshold: scheme.threshold(),
            success: result.is_ok(),
            error_type: result.as_ref().err().map(|e| e.code().to_string()),
            attempted_at: now,
        };
        if let Err(e) = self.metrics.record(&attempt) {
            log::warn!("Failed to record recovery attempt: {e}");
        }

        match &result {
            Ok(_) => log::info!(
                "Recovered secret with {} ({} fragments supplied)",
                scheme,
                request.fragments.len()
            ),
            Err(e) => log::warn!("Recovery failed with {}: {}", scheme, e.code()),
        }
        result
    }

    fn reconstruct(
        &self,
        request: &RecoveryRequest,
        scheme: Scheme,
        source: SchemeSource,
    ) -> Result<RecoveryOutcome, VaultError> {
        let threshold = scheme.threshold() as usize;
        let provided = request.fragments.len();
        if provided < threshold {
            return Err(VaultError::InsufficientFragments {
                scheme,
                provided,
                required: threshold,
            });
        }

        let shares = request
            .fragments
            .iter()
            .map(ProvidedFragment::decode)
            .collect::<Result<Vec<Share>, _>>()?;

        if shares.len() > threshold && !verify_shares(&shares, threshold)? {
            return Err(VaultError::InconsistentFragments);
        }

        let secret = combine_shares(&shares[..threshold], scheme.threshold())
            .map_err(|e| VaultError::ReconstructionFailed(e.to_string()))?;

        Ok(RecoveryOutcome {
            secret: MasterSecret::from(secret),
            scheme,
            scheme_source: source,
            fragments_used: threshold,
            fragments_provided: provided,
        })
    }
}
