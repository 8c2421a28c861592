//! Vigil Shamir Module
//!
//! Split and reconstruct vault master secrets using Shamir's Secret Sharing
//! over the prime field GF(2^127 - 1).
//!
//! # Example: Split a 32-byte secret
//!
//! ```
//! use vigil_shamir::{combine_shares, split_secret, Share};
//!
//! let secret = vec![0x42u8; 32];
//!
//! // Split into 2-of-3 shares
//! let shares = split_secret(&secret, 2, 3).unwrap();
//!
//! // Shares are exchanged as hex strings
//! let encoded: Vec<String> = shares.iter().map(|s| s.to_hex().to_string()).collect();
//!
//! // Recover with any 2 shares
//! let parsed: Vec<Share> = encoded[1..]
//!     .iter()
//!     .map(|s| Share::from_hex(s).unwrap())
//!     .collect();
//! let recovered = combine_shares(&parsed, 2).unwrap();
//! assert_eq!(recovered.as_slice(), &secret[..]);
//! ```

pub mod field;
pub mod shamir;
pub mod shares;

// Re-exports
pub use shamir::{
    combine_shares, reconstruct_secret, split_secret, split_secret_with_rng, verify_shares, Share,
};
pub use shares::parse_shares;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShamirError {
    #[error("Invalid threshold: need at least 2")]
    InvalidThreshold,
    #[error("Threshold exceeds share count")]
    ThresholdExceedsShares,
    #[error("Not enough shares to reconstruct: {provided} of {required}")]
    InsufficientShares { provided: usize, required: usize },
    #[error("Secret is empty")]
    EmptySecret,
    #[error("Secret too long: {0} bytes")]
    SecretTooLong(usize),
    #[error("Shares do not belong to the same secret")]
    Inconsistent,
    #[error("Invalid share format: {0}")]
    InvalidShare(String),
}

/// Configuration for Shamir split
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShamirConfig {
    /// Minimum shares needed to reconstruct (M)
    pub threshold: u8,
    /// Total shares to generate (N)
    pub total_shares: u8,
}

impl ShamirConfig {
    /// Common 2-of-3 setup
    pub fn two_of_three() -> Self {
        Self {
            threshold: 2,
            total_shares: 3,
        }
    }

    /// Common 3-of-5 setup
    pub fn three_of_five() -> Self {
        Self {
            threshold: 3,
            total_shares: 5,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ShamirError> {
        if self.threshold < 2 {
            return Err(ShamirError::InvalidThreshold);
        }
        if self.threshold > self.total_shares {
            return Err(ShamirError::ThresholdExceedsShares);
        }
        Ok(())
    }

    /// Split `secret` according to this configuration
    pub fn split(&self, secret: &[u8]) -> Result<Vec<Share>, ShamirError> {
        self.validate()?;
        split_secret(secret, self.threshold, self.total_shares)
    }
}
