//! Share text encoding
//!
//! Shares travel as lowercase hex so they can be pasted, printed or
//! encrypted as plain strings:
//!
//! ```text
//! [version: 1][index: 1][secret_len: 2 BE][value: 16 BE] * blocks
//! ```

use crate::field::{FieldElement, ELEMENT_BYTES};
use crate::shamir::Share;
use crate::ShamirError;
use zeroize::Zeroizing;

/// Current share encoding version
pub const SHARE_VERSION: u8 = 0x01;

const HEADER_LEN: usize = 4;

impl Share {
    /// Serialize to the binary share format
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(HEADER_LEN + self.values.len() * ELEMENT_BYTES));
        out.push(SHARE_VERSION);
        out.push(self.index);
        out.extend_from_slice(&self.secret_len.to_be_bytes());
        for value in &self.values {
            out.extend_from_slice(&value.to_be_bytes());
        }
        out
    }

    /// Parse the binary share format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ShamirError> {
        if bytes.len() < HEADER_LEN {
            return Err(ShamirError::InvalidShare("share too short".into()));
        }
        if bytes[0] != SHARE_VERSION {
            return Err(ShamirError::InvalidShare(format!(
                "unsupported share version {}",
                bytes[0]
            )));
        }

        let index = bytes[1];
        if index == 0 {
            return Err(ShamirError::InvalidShare("share index 0".into()));
        }

        let secret_len = u16::from_be_bytes([bytes[2], bytes[3]]);
        if secret_len == 0 {
            return Err(ShamirError::InvalidShare("zero secret length".into()));
        }

        let body = &bytes[HEADER_LEN..];
        let expected = Share::block_count(secret_len as usize) * ELEMENT_BYTES;
        if body.len() != expected {
            return Err(ShamirError::InvalidShare(format!(
                "share body is {} bytes, expected {}",
                body.len(),
                expected
            )));
        }

        let values = body
            .chunks_exact(ELEMENT_BYTES)
            .map(|chunk| {
                let mut buf = [0u8; ELEMENT_BYTES];
                buf.copy_from_slice(chunk);
                FieldElement::from_be_bytes(buf)
                    .ok_or_else(|| ShamirError::InvalidShare("value outside field".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Share {
            index,
            secret_len,
            values,
        })
    }

    /// Export as a hex string suitable for backup
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.to_bytes().as_slice()))
    }

    /// Parse a share from its hex string (surrounding whitespace ignored)
    pub fn from_hex(input: &str) -> Result<Self, ShamirError> {
        let trimmed = input.trim();
        let bytes = Zeroizing::new(
            hex::decode(trimmed).map_err(|e| ShamirError::InvalidShare(format!("not hex: {e}")))?,
        );
        Self::from_bytes(&bytes)
    }
}

/// Parse a batch of hex shares, failing on the first malformed one
pub fn parse_shares<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<Share>, ShamirError> {
    inputs.iter().map(|s| Share::from_hex(s.as_ref())).collect()
}
