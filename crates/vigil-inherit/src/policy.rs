//! Vault policy: fragment schemes, timing bounds, tier limits and lifecycle
//! tuning.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;
use vigil_shamir::ShamirConfig;

/// Allowed check-in interval in days
pub const CHECK_IN_INTERVAL_DAYS: RangeInclusive<u32> = 30..=365;

/// Allowed grace period in days
pub const GRACE_PERIOD_DAYS: RangeInclusive<u32> = 7..=90;

/// Minimum number of shares generated, whatever the guardian count
const MIN_TOTAL_SHARES: usize = 3;

/// Policy violations in party sets and role checks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Guardian listed twice: {0}")]
    DuplicateGuardian(String),

    #[error("Identity is both guardian and beneficiary: {0}")]
    GuardianBeneficiaryOverlap(String),

    #[error("Too many guardians: {got} (tier allows {max})")]
    TooManyGuardians { max: usize, got: usize },

    #[error("Too many beneficiaries: {got} (tier allows {max})")]
    TooManyBeneficiaries { max: usize, got: usize },

    #[error("{action} is not permitted for this party")]
    NotPermitted { action: &'static str },

    #[error("Only the vault owner may {0}")]
    NotOwner(&'static str),
}

impl PolicyError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            PolicyError::DuplicateGuardian(_) => "DUPLICATE_GUARDIAN",
            PolicyError::GuardianBeneficiaryOverlap(_) => "GUARDIAN_BENEFICIARY_OVERLAP",
            PolicyError::TooManyGuardians { .. } | PolicyError::TooManyBeneficiaries { .. } => {
                "TIER_LIMIT_EXCEEDED"
            }
            PolicyError::NotPermitted { .. } => "ROLE_NOT_PERMITTED",
            PolicyError::NotOwner(_) => "NOT_OWNER",
        }
    }
}

/// Threshold scheme used to split a vault's master secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    #[serde(rename = "2-of-3")]
    TwoOfThree,
    #[serde(rename = "3-of-5")]
    ThreeOfFive,
}

impl Default for Scheme {
    fn default() -> Self {
        Scheme::TwoOfThree
    }
}

impl Scheme {
    /// Shares required to reconstruct
    pub fn threshold(self) -> u8 {
        match self {
            Scheme::TwoOfThree => 2,
            Scheme::ThreeOfFive => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::TwoOfThree => "2-of-3",
            Scheme::ThreeOfFive => "3-of-5",
        }
    }

    /// Scheme chosen at creation: 3-of-5 iff exactly five guardians
    pub fn for_guardian_count(guardians: usize) -> Self {
        if guardians == 5 {
            Scheme::ThreeOfFive
        } else {
            Scheme::TwoOfThree
        }
    }

    /// Legacy fallback for vaults that never recorded their scheme
    pub fn infer_from_fragment_count(fragments: usize) -> Self {
        Self::for_guardian_count(fragments)
    }

    /// Shares to generate for a guardian set: `max(guardians, 3)`
    pub fn total_shares(guardians: usize) -> usize {
        guardians.max(MIN_TOTAL_SHARES)
    }

    /// Shamir parameters for a vault with `guardians` guardians
    pub fn shamir_config(self, guardians: usize) -> ShamirConfig {
        ShamirConfig {
            threshold: self.threshold(),
            total_shares: Self::total_shares(guardians).min(u8::MAX as usize) as u8,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "2-of-3" => Ok(Scheme::TwoOfThree),
            "3-of-5" => Ok(Scheme::ThreeOfFive),
            other => Err(format!("unknown scheme: {other}")),
        }
    }
}

/// Party count limits for the owner's subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierLimits {
    pub max_guardians: usize,
    pub max_beneficiaries: usize,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            max_guardians: 5,
            max_beneficiaries: 10,
        }
    }
}

/// Which roles may submit death/incapacity attestations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationRoles {
    /// Guardians and dedicated attestors
    #[default]
    GuardiansAndAttestors,
    /// Dedicated attestors only
    AttestorsOnly,
}

/// Lifecycle tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecyclePolicy {
    /// Attestations needed to force a trigger
    pub attestation_quorum: usize,

    /// Who may attest
    pub attestation_roles: AttestationRoles,

    /// Hours after triggering during which the owner may still revoke
    pub revoke_window_hours: u32,

    /// Days an invitation stays valid
    pub invite_ttl_days: u32,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            attestation_quorum: 2,
            attestation_roles: AttestationRoles::default(),
            revoke_window_hours: 48,
            invite_ttl_days: 14,
        }
    }
}

impl LifecyclePolicy {
    pub fn revoke_window(&self) -> Duration {
        Duration::hours(self.revoke_window_hours as i64)
    }

    pub fn invite_ttl(&self) -> Duration {
        Duration::days(self.invite_ttl_days as i64)
    }

    /// Validate that the knobs are usable
    pub fn validate(&self) -> Result<(), String> {
        if self.attestation_quorum == 0 {
            return Err("attestation_quorum must be >= 1".into());
        }
        if self.invite_ttl_days == 0 {
            return Err("invite_ttl_days must be >= 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_selection() {
        assert_eq!(Scheme::for_guardian_count(1), Scheme::TwoOfThree);
        assert_eq!(Scheme::for_guardian_count(3), Scheme::TwoOfThree);
        assert_eq!(Scheme::for_guardian_count(4), Scheme::TwoOfThree);
        assert_eq!(Scheme::for_guardian_count(5), Scheme::ThreeOfFive);
        assert_eq!(Scheme::for_guardian_count(6), Scheme::TwoOfThree);
    }

    #[test]
    fn test_total_shares() {
        assert_eq!(Scheme::total_shares(1), 3);
        assert_eq!(Scheme::total_shares(3), 3);
        assert_eq!(Scheme::total_shares(5), 5);

        let config = Scheme::ThreeOfFive.shamir_config(5);
        assert_eq!((config.threshold, config.total_shares), (3, 5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scheme_string_forms() {
        assert_eq!("3-of-5".parse::<Scheme>().unwrap(), Scheme::ThreeOfFive);
        assert_eq!(Scheme::TwoOfThree.to_string(), "2-of-3");
        assert!("4-of-7".parse::<Scheme>().is_err());

        let json = serde_json::to_string(&Scheme::ThreeOfFive).unwrap();
        assert_eq!(json, "\"3-of-5\"");
    }

    #[test]
    fn test_lifecycle_policy_validation() {
        assert!(LifecyclePolicy::default().validate().is_ok());
        let bad = LifecyclePolicy {
            attestation_quorum: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_policy_error_codes() {
        assert_eq!(
            PolicyError::GuardianBeneficiaryOverlap("a@b.c".into()).code(),
            "GUARDIAN_BENEFICIARY_OVERLAP"
        );
        assert_eq!(
            PolicyError::TooManyGuardians { max: 5, got: 6 }.code(),
            "TIER_LIMIT_EXCEEDED"
        );
    }
}
