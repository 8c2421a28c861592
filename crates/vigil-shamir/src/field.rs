//! Prime field arithmetic for Shamir's Secret Sharing
//!
//! Works modulo the Mersenne prime p = 2^127 - 1. Elements fit in a `u128`
//! and reduction is a shift-and-add because 2^127 ≡ 1 (mod p).

use rand::RngCore;
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// The field modulus, 2^127 - 1
pub const PRIME: u128 = (1u128 << 127) - 1;

/// Bytes of secret packed into one field element (120 bits < 127)
pub const BLOCK_BYTES: usize = 15;

/// Bytes used to serialize one field element
pub const ELEMENT_BYTES: usize = 16;

const LOW_64: u128 = u64::MAX as u128;

/// An element of GF(p)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldElement(u128);

// Zero is the Default, so wiping writes zeros
impl zeroize::DefaultIsZeroes for FieldElement {}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fp({:#x})", self.0)
    }
}

/// Fold a value below 2^128 into [0, p)
#[inline]
fn reduce(x: u128) -> u128 {
    let r = (x & PRIME) + (x >> 127);
    if r >= PRIME {
        r - PRIME
    } else {
        r
    }
}

impl FieldElement {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(1);

    /// Canonical constructor. Returns `None` for values outside the field.
    pub fn new(value: u128) -> Option<Self> {
        (value < PRIME).then_some(Self(value))
    }

    /// Build an element from a small integer (share indices)
    pub fn from_u64(value: u64) -> Self {
        Self(value as u128)
    }

    /// Raw canonical value
    pub fn value(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Uniformly random element.
    ///
    /// Rejection sampling over 127-bit candidates: only the single value `p`
    /// itself is rejected, so the loop practically never repeats.
    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        loop {
            let mut buf = [0u8; ELEMENT_BYTES];
            rng.fill_bytes(&mut buf);
            let candidate = u128::from_be_bytes(buf) & PRIME;
            if candidate < PRIME {
                return Self(candidate);
            }
        }
    }

    /// Pack up to [`BLOCK_BYTES`] big-endian bytes into an element
    pub fn from_block(block: &[u8]) -> Self {
        debug_assert!(block.len() <= BLOCK_BYTES);
        let mut buf = [0u8; ELEMENT_BYTES];
        buf[ELEMENT_BYTES - block.len()..].copy_from_slice(block);
        // 120 bits never reach p
        Self(u128::from_be_bytes(buf))
    }

    /// Unpack the low `len` bytes (big-endian) of the element.
    ///
    /// Returns `None` if the element does not fit in `len` bytes, which means
    /// the shares it came from were inconsistent.
    pub fn to_block(self, len: usize) -> Option<Vec<u8>> {
        let bytes = self.0.to_be_bytes();
        let (high, low) = bytes.split_at(ELEMENT_BYTES - len);
        if high.iter().any(|&b| b != 0) {
            return None;
        }
        Some(low.to_vec())
    }

    pub fn to_be_bytes(self) -> [u8; ELEMENT_BYTES] {
        self.0.to_be_bytes()
    }

    /// Parse a serialized element, rejecting non-canonical values
    pub fn from_be_bytes(bytes: [u8; ELEMENT_BYTES]) -> Option<Self> {
        Self::new(u128::from_be_bytes(bytes))
    }

    /// Exponentiation by squaring
    pub fn pow(self, mut exp: u128) -> Self {
        let mut base = self;
        let mut acc = Self::ONE;
        while exp > 0 {
            if exp & 1 == 1 {
                acc = acc * base;
            }
            base = base * base;
            exp >>= 1;
        }
        acc
    }

    /// Multiplicative inverse via Fermat's little theorem. `None` for zero.
    pub fn inverse(self) -> Option<Self> {
        if self.is_zero() {
            None
        } else {
            Some(self.pow(PRIME - 2))
        }
    }
}

impl Add for FieldElement {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        // both < 2^127, so the sum fits
        Self(reduce(self.0 + rhs.0))
    }
}

impl Sub for FieldElement {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        if self.0 >= rhs.0 {
            Self(self.0 - rhs.0)
        } else {
            Self(self.0 + PRIME - rhs.0)
        }
    }
}

impl Mul for FieldElement {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let (a_hi, a_lo) = (self.0 >> 64, self.0 & LOW_64);
        let (b_hi, b_lo) = (rhs.0 >> 64, rhs.0 & LOW_64);

        // a_hi, b_hi < 2^63, so none of these overflow
        let lo = a_lo * b_lo;
        let mid = a_lo * b_hi + a_hi * b_lo;
        let hi = a_hi * b_hi;

        // product = hi·2^128 + mid·2^64 + lo, and 2^128 ≡ 2
        let (mid_hi, mid_lo) = (mid >> 64, mid & LOW_64);
        let terms = [reduce(lo), reduce(mid_lo << 64), reduce(mid_hi << 1), reduce(hi << 1)];
        terms
            .into_iter()
            .fold(Self::ZERO, |acc, t| acc + Self(t))
    }
}

/// Evaluate a polynomial at `x` (Horner's method).
/// `coefficients[0]` is the constant term.
pub fn poly_eval(coefficients: &[FieldElement], x: FieldElement) -> FieldElement {
    coefficients
        .iter()
        .rev()
        .fold(FieldElement::ZERO, |acc, &c| acc * x + c)
}

/// Lagrange interpolation of the points, evaluated at `x`.
///
/// Returns `None` if two points share an x coordinate.
pub fn interpolate_at(points: &[(FieldElement, FieldElement)], x: FieldElement) -> Option<FieldElement> {
    let mut result = FieldElement::ZERO;

    for (i, &(xi, yi)) in points.iter().enumerate() {
        let mut numerator = FieldElement::ONE;
        let mut denominator = FieldElement::ONE;

        for (j, &(xj, _)) in points.iter().enumerate() {
            if i != j {
                numerator = numerator * (x - xj);
                denominator = denominator * (xi - xj);
            }
        }

        let basis = numerator * denominator.inverse()?;
        result = result + yi * basis;
    }

    Some(result)
}
