//! The vault master secret

use rand::RngCore;
use std::fmt;
use zeroize::Zeroizing;

/// Default master secret size: 256 bits
pub const MASTER_SECRET_LEN: usize = 32;

/// The owner's wallet recovery value.
///
/// Only ever held in memory; wiped on drop and redacted in `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterSecret(Zeroizing<Vec<u8>>);

impl MasterSecret {
    /// Fresh random secret from the thread-local CSPRNG
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new(vec![0u8; MASTER_SECRET_LEN]);
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    /// Parse from hex (as handed to the owner)
    pub fn from_hex(input: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(input.trim()).map(Self::from_bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex rendering for one-time display to the owner
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterSecret([REDACTED; {}])", self.0.len())
    }
}

impl From<Zeroizing<Vec<u8>>> for MasterSecret {
    fn from(bytes: Zeroizing<Vec<u8>>) -> Self {
        Self(bytes)
    }
}
