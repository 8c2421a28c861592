//! Core Shamir's Secret Sharing implementation
//!
//! Split a secret into N shares where any M can reconstruct it. The secret
//! is cut into 15-byte blocks and each block is the constant term of its own
//! random polynomial over GF(2^127 - 1).

use crate::field::{interpolate_at, poly_eval, FieldElement, BLOCK_BYTES};
use crate::ShamirError;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

/// Largest secret we agree to split (length is encoded as u16)
pub const MAX_SECRET_LEN: usize = u16::MAX as usize;

/// A single share of a secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    /// Share index (1..=N, never 0)
    pub index: u8,
    /// Length of the original secret in bytes
    pub secret_len: u16,
    /// One polynomial evaluation per secret block
    pub values: Vec<FieldElement>,
}

impl Share {
    /// Number of blocks a secret of `len` bytes occupies
    pub fn block_count(len: usize) -> usize {
        len.div_ceil(BLOCK_BYTES)
    }

    fn x(&self) -> FieldElement {
        FieldElement::from_u64(self.index as u64)
    }
}

/// Split a secret into shares using the thread-local CSPRNG.
///
/// # Arguments
/// * `secret` - The secret bytes to split
/// * `threshold` - Minimum shares needed to reconstruct (M)
/// * `total` - Total shares to generate (N)
///
/// # Returns
/// Vector of N shares, any M of which can reconstruct the secret
pub fn split_secret(secret: &[u8], threshold: u8, total: u8) -> Result<Vec<Share>, ShamirError> {
    split_secret_with_rng(secret, threshold, total, &mut rand::thread_rng())
}

/// Split a secret with a caller-supplied CSPRNG
pub fn split_secret_with_rng<R: RngCore + CryptoRng>(
    secret: &[u8],
    threshold: u8,
    total: u8,
    rng: &mut R,
) -> Result<Vec<Share>, ShamirError> {
    if threshold < 2 {
        return Err(ShamirError::InvalidThreshold);
    }
    if threshold > total {
        return Err(ShamirError::ThresholdExceedsShares);
    }
    if secret.is_empty() {
        return Err(ShamirError::EmptySecret);
    }
    if secret.len() > MAX_SECRET_LEN {
        return Err(ShamirError::SecretTooLong(secret.len()));
    }

    let blocks = Share::block_count(secret.len());
    let mut shares: Vec<Share> = (1..=total)
        .map(|i| Share {
            index: i,
            secret_len: secret.len() as u16,
            values: Vec::with_capacity(blocks),
        })
        .collect();

    // p(x) = s + c1*x + ... + c_{t-1}*x^{t-1}, fresh coefficients per block
    let mut coefficients = Zeroizing::new(Vec::with_capacity(threshold as usize));
    for block in secret.chunks(BLOCK_BYTES) {
        coefficients.clear();
        coefficients.push(FieldElement::from_block(block));
        for _ in 1..threshold {
            coefficients.push(FieldElement::random(rng));
        }

        for share in &mut shares {
            share.values.push(poly_eval(&coefficients, share.x()));
        }
    }

    Ok(shares)
}

/// Check that shares are structurally compatible with each other
fn validate_shares(shares: &[Share]) -> Result<(), ShamirError> {
    let first = shares.first().ok_or(ShamirError::InsufficientShares {
        provided: 0,
        required: 1,
    })?;

    let secret_len = first.secret_len as usize;
    if secret_len == 0 {
        return Err(ShamirError::InvalidShare("zero secret length".into()));
    }
    let blocks = Share::block_count(secret_len);

    for share in shares {
        if share.index == 0 {
            return Err(ShamirError::InvalidShare("share index 0".into()));
        }
        if share.secret_len != first.secret_len {
            return Err(ShamirError::InvalidShare(
                "Shares have different lengths".into(),
            ));
        }
        if share.values.len() != blocks {
            return Err(ShamirError::InvalidShare(format!(
                "share {} has {} blocks, expected {}",
                share.index,
                share.values.len(),
                blocks
            )));
        }
    }

    let mut indices: Vec<u8> = shares.iter().map(|s| s.index).collect();
    indices.sort_unstable();
    indices.dedup();
    if indices.len() != shares.len() {
        return Err(ShamirError::InvalidShare("Duplicate share indices".into()));
    }

    Ok(())
}

fn block_points(shares: &[Share], block: usize) -> Vec<(FieldElement, FieldElement)> {
    shares.iter().map(|s| (s.x(), s.values[block])).collect()
}

/// Reconstruct a secret by interpolating through every supplied share.
///
/// The caller is responsible for supplying at least the threshold; with
/// fewer shares the result is an unrelated value. Use [`combine_shares`]
/// when the threshold is known.
pub fn reconstruct_secret(shares: &[Share]) -> Result<Zeroizing<Vec<u8>>, ShamirError> {
    validate_shares(shares)?;

    let secret_len = shares[0].secret_len as usize;
    let mut secret = Zeroizing::new(Vec::with_capacity(secret_len));

    for (block_idx, chunk_len) in block_lengths(secret_len).enumerate() {
        let value = interpolate_at(&block_points(shares, block_idx), FieldElement::ZERO)
            .ok_or_else(|| ShamirError::InvalidShare("Duplicate share indices".into()))?;
        // A corrupted share usually lands outside the block's byte range
        let bytes = value.to_block(chunk_len).ok_or(ShamirError::Inconsistent)?;
        secret.extend_from_slice(&bytes);
    }

    Ok(secret)
}

fn block_lengths(secret_len: usize) -> impl Iterator<Item = usize> {
    (0..Share::block_count(secret_len)).map(move |i| BLOCK_BYTES.min(secret_len - i * BLOCK_BYTES))
}

/// Verify that shares are consistent (all lie on the same polynomials)
///
/// Interpolates through the first `threshold` shares and checks that every
/// further share evaluates to the same polynomial. If this holds, every
/// threshold-sized subset reconstructs the same secret.
pub fn verify_shares(shares: &[Share], threshold: usize) -> Result<bool, ShamirError> {
    if threshold < 2 {
        return Err(ShamirError::InvalidThreshold);
    }
    if shares.len() < threshold {
        return Err(ShamirError::InsufficientShares {
            provided: shares.len(),
            required: threshold,
        });
    }
    validate_shares(shares)?;

    let (basis, extra) = shares.split_at(threshold);
    for block_idx in 0..basis[0].values.len() {
        let points = block_points(basis, block_idx);
        for share in extra {
            let expected = interpolate_at(&points, share.x())
                .ok_or_else(|| ShamirError::InvalidShare("Duplicate share indices".into()))?;
            if expected != share.values[block_idx] {
                return Ok(false);
            }
        }
    }

    Ok(true)
}

/// Reconstruct with a known threshold.
///
/// Uses exactly the first `threshold` shares for interpolation; any further
/// shares must agree with them or the call fails with
/// [`ShamirError::Inconsistent`].
pub fn combine_shares(shares: &[Share], threshold: u8) -> Result<Zeroizing<Vec<u8>>, ShamirError> {
    let threshold = threshold as usize;
    if threshold < 2 {
        return Err(ShamirError::InvalidThreshold);
    }
    if shares.len() < threshold {
        return Err(ShamirError::InsufficientShares {
            provided: shares.len(),
            required: threshold,
        });
    }
    if shares.len() > threshold && !verify_shares(shares, threshold)? {
        return Err(ShamirError::Inconsistent);
    }
    reconstruct_secret(&shares[..threshold])
}
