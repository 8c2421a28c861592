//! Fragment encryption
//!
//! Password-based authenticated encryption for guardian fragments using
//! Argon2id + AES-256-GCM, serialized as a self-describing envelope.
//!
//! # Security Notes
//!
//! - Argon2id is memory-hard (resistant to GPU/ASIC attacks)
//! - AES-256-GCM provides authenticated encryption
//! - Each encryption uses a random salt and nonce
//! - The envelope header is bound as associated data
//! - Decryption either returns the exact plaintext or fails; never partial output

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Key, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// Envelope format version
pub const ENVELOPE_VERSION: u8 = 1;

/// Algorithm label recorded in the envelope
pub const ENVELOPE_ALG: &str = "argon2id-aes256gcm";

/// Salt length for Argon2
const SALT_LEN: usize = 16;

/// Nonce length for AES-256-GCM
const NONCE_LEN: usize = 12;

/// GCM authentication tag length
const TAG_LEN: usize = 16;

/// 256 bits for AES-256
const KEY_LEN: usize = 32;

/// Upper bound on memory cost accepted from an envelope (1 GiB)
const MAX_M_COST: u32 = 1 << 20;

/// Upper bound on iterations accepted from an envelope
const MAX_T_COST: u32 = 16;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("Authentication failed: wrong passphrase or tampered fragment")]
    AuthenticationFailure,
    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),
    #[error("Invalid fragment format: {0}")]
    InvalidFormat(String),
}

/// Argon2id cost parameters, stored in each envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherParams {
    /// Memory cost in KiB
    #[serde(rename = "m")]
    pub m_cost: u32,
    /// Iterations
    #[serde(rename = "t")]
    pub t_cost: u32,
    /// Parallelism
    #[serde(rename = "p")]
    pub p_cost: u32,
}

impl Default for CipherParams {
    /// OWASP recommendations for 2024+: 64 MiB, 3 iterations, 4 lanes
    fn default() -> Self {
        Self {
            m_cost: 65536,
            t_cost: 3,
            p_cost: 4,
        }
    }
}

impl CipherParams {
    /// Light preset for interactive use and tests (8 MiB, 1 iteration)
    pub fn interactive() -> Self {
        Self {
            m_cost: 8192,
            t_cost: 1,
            p_cost: 1,
        }
    }

    /// Reject parameters that are invalid or would let a stored envelope
    /// force unbounded work
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.m_cost > MAX_M_COST || self.t_cost == 0 || self.t_cost > MAX_T_COST {
            return Err(CryptoError::InvalidFormat(format!(
                "argon2 parameters out of range: {self:?}"
            )));
        }
        self.argon2_params().map(|_| ())
    }

    fn argon2_params(&self) -> Result<Params, CryptoError> {
        Params::new(self.m_cost, self.t_cost, self.p_cost, Some(KEY_LEN))
            .map_err(|e| CryptoError::InvalidFormat(format!("argon2 parameters: {e}")))
    }
}

/// An encrypted fragment.
///
/// Serialized form:
/// `{"v":1,"alg":"argon2id-aes256gcm","kdf":{"m":..,"t":..,"p":..},"salt":..,"nonce":..,"ct":..,"tag":..}`
/// with binary fields in standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedFragment {
    #[serde(rename = "v")]
    pub version: u8,
    pub alg: String,
    pub kdf: CipherParams,
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(rename = "ct", with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub tag: Vec<u8>,
}

/// Serde helper for base64 byte fields
mod b64 {
    use super::B64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&B64.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        B64.decode(s).map_err(serde::de::Error::custom)
    }
}

impl EncryptedFragment {
    /// Serialize to the stored string form
    pub fn to_envelope(&self) -> String {
        // Plain struct of strings and integers: serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse and structurally validate a stored envelope
    pub fn from_envelope(envelope: &str) -> Result<Self, CryptoError> {
        let parsed: Self = serde_json::from_str(envelope.trim())
            .map_err(|e| CryptoError::InvalidFormat(e.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Cheap check used to tell envelopes apart from plaintext shares
    pub fn looks_like_envelope(input: &str) -> bool {
        input.trim_start().starts_with('{')
    }

    fn validate(&self) -> Result<(), CryptoError> {
        if self.version != ENVELOPE_VERSION {
            return Err(CryptoError::InvalidFormat(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if self.alg != ENVELOPE_ALG {
            return Err(CryptoError::InvalidFormat(format!(
                "unsupported algorithm {}",
                self.alg
            )));
        }
        if self.salt.len() != SALT_LEN {
            return Err(CryptoError::InvalidFormat("salt length".into()));
        }
        if self.nonce.len() != NONCE_LEN {
            return Err(CryptoError::InvalidFormat("nonce length".into()));
        }
        if self.tag.len() != TAG_LEN {
            return Err(CryptoError::InvalidFormat("tag length".into()));
        }
        if self.ciphertext.is_empty() {
            return Err(CryptoError::InvalidFormat("empty ciphertext".into()));
        }
        self.kdf.validate()
    }
}

/// Associated data: binds version and algorithm to the ciphertext
fn associated_data(version: u8, alg: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(alg.len() + 8);
    aad.extend_from_slice(b"vigil-fragment/");
    aad.push(version);
    aad.extend_from_slice(alg.as_bytes());
    aad
}

/// Derive an encryption key from a passphrase using Argon2id
fn derive_key(
    passphrase: &str,
    salt: &[u8],
    params: &CipherParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.argon2_params()?);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, key.as_mut_slice())
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;

    Ok(key)
}

/// Encrypt a share under a passphrase
///
/// Each call generates a new random salt and nonce, so encrypting the same
/// share twice gives different envelopes.
pub fn encrypt_fragment(
    plaintext: &[u8],
    passphrase: &str,
    params: &CipherParams,
) -> Result<EncryptedFragment, CryptoError> {
    if plaintext.is_empty() {
        return Err(CryptoError::EncryptionFailed("empty plaintext".into()));
    }
    params.validate()?;

    // 16 bytes = 128 bits of entropy from the OS CSPRNG
    let mut salt = vec![0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let key = derive_key(passphrase, &salt, params)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));

    let aad = associated_data(ENVELOPE_VERSION, ENVELOPE_ALG);
    let mut sealed = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // aes-gcm appends the tag; keep it as its own field
    let tag = sealed.split_off(sealed.len() - TAG_LEN);

    Ok(EncryptedFragment {
        version: ENVELOPE_VERSION,
        alg: ENVELOPE_ALG.to_string(),
        kdf: *params,
        salt,
        nonce: nonce.to_vec(),
        ciphertext: sealed,
        tag,
    })
}

/// Decrypt a fragment with its passphrase
///
/// # Errors
/// `AuthenticationFailure` if the passphrase is wrong or any authenticated
/// byte was modified; `InvalidFormat` if the envelope is malformed.
pub fn decrypt_fragment(
    encrypted: &EncryptedFragment,
    passphrase: &str,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    encrypted.validate()?;

    let key = derive_key(passphrase, &encrypted.salt, &encrypted.kdf)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));

    let mut sealed = Vec::with_capacity(encrypted.ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(&encrypted.ciphertext);
    sealed.extend_from_slice(&encrypted.tag);

    let aad = associated_data(encrypted.version, &encrypted.alg);
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&encrypted.nonce),
            Payload {
                msg: &sealed,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::AuthenticationFailure)?;

    Ok(Zeroizing::new(plaintext))
}

/// Encrypt and serialize in one step
pub fn seal_to_envelope(
    plaintext: &[u8],
    passphrase: &str,
    params: &CipherParams,
) -> Result<String, CryptoError> {
    encrypt_fragment(plaintext, passphrase, params).map(|f| f.to_envelope())
}

/// Parse and decrypt in one step
pub fn open_envelope(envelope: &str, passphrase: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    decrypt_fragment(&EncryptedFragment::from_envelope(envelope)?, passphrase)
}
