//! Guardian passphrase derivation
//!
//! Each guardian's fragment is encrypted under a passphrase that is a pure
//! function of `(master secret, guardian identity, fragment index)`:
//!
//! ```text
//! HKDF-SHA256(ikm = master, salt = DOMAIN, info = "<guardian>:fragment:<index>")
//! ```
//!
//! The info string doubles as the audit salt stored next to the fragment.
//! It is public; without the master secret it derives nothing.

use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

/// HKDF salt, fixed for domain separation
const DOMAIN: &[u8] = b"vigil/guardian-passphrase/v1";

/// Raw passphrase entropy in bytes (192 bits)
const PASSPHRASE_BYTES: usize = 24;

/// Hex characters per dash-separated group
const GROUP_LEN: usize = 8;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PassphraseError {
    #[error("Master secret is empty")]
    EmptySecret,
    #[error("Guardian identity is empty")]
    EmptyIdentity,
    #[error("Key derivation failed: {0}")]
    Derivation(String),
}

/// Normalize a guardian identity (emails compare case-insensitively)
pub fn normalize_identity(identity: &str) -> String {
    identity.trim().to_ascii_lowercase()
}

/// Audit salt recorded with a fragment: `guardian:fragment:index`
pub fn derivation_salt(guardian: &str, fragment_index: u32) -> String {
    format!("{}:fragment:{}", normalize_identity(guardian), fragment_index)
}

/// Derive the passphrase for one guardian's fragment.
///
/// Deterministic: the same inputs always give the same passphrase, so a
/// guardian who loses theirs can be re-issued the identical one while the
/// master secret is available.
///
/// # Example
/// ```
/// use vigil_core::passphrase::derive_passphrase;
/// let p1 = derive_passphrase(b"master", "alice@example.com", 0).unwrap();
/// let p2 = derive_passphrase(b"master", "ALICE@example.com ", 0).unwrap();
/// assert_eq!(*p1, *p2);
/// assert_eq!(p1.split('-').count(), 6);
/// ```
pub fn derive_passphrase(
    master_secret: &[u8],
    guardian: &str,
    fragment_index: u32,
) -> Result<Zeroizing<String>, PassphraseError> {
    if master_secret.is_empty() {
        return Err(PassphraseError::EmptySecret);
    }
    let identity = normalize_identity(guardian);
    if identity.is_empty() {
        return Err(PassphraseError::EmptyIdentity);
    }

    let hkdf = Hkdf::<Sha256>::new(Some(DOMAIN), master_secret);
    let info = derivation_salt(&identity, fragment_index);

    let mut okm = Zeroizing::new([0u8; PASSPHRASE_BYTES]);
    hkdf.expand(info.as_bytes(), okm.as_mut_slice())
        .map_err(|e| PassphraseError::Derivation(e.to_string()))?;

    Ok(format_groups(&okm[..]))
}

/// Render bytes as dash-separated lowercase hex groups
fn format_groups(bytes: &[u8]) -> Zeroizing<String> {
    let hex = Zeroizing::new(hex::encode(bytes));
    let groups: Vec<&str> = hex
        .as_bytes()
        .chunks(GROUP_LEN)
        // hex output is ASCII
        .map(|c| std::str::from_utf8(c).unwrap_or_default())
        .collect();
    Zeroizing::new(groups.join("-"))
}
