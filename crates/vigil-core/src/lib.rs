//! Vigil Core
//!
//! Key material and fragment cryptography for Vigil vaults.
//!
//! # Passphrases
//!
//! Every guardian fragment is protected by a passphrase derived with
//! HKDF-SHA256 from the master secret, the guardian identity and the
//! fragment index. See [`passphrase`].
//!
//! # Encrypted Fragments
//!
//! Fragments are encrypted at rest using Argon2id + AES-256-GCM inside a
//! versioned JSON envelope. See [`crypto`].

pub mod crypto;
pub mod passphrase;
pub mod secret;

pub use crypto::{
    decrypt_fragment, encrypt_fragment, open_envelope, seal_to_envelope, CipherParams,
    CryptoError, EncryptedFragment,
};
pub use passphrase::{derivation_salt, derive_passphrase, normalize_identity, PassphraseError};
pub use secret::MasterSecret;
