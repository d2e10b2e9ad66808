//! # Crypto Adapter
//!
//! The port the exchange bridge uses to encrypt descriptors. Implementations
//! work on bytes so the trait stays object-safe; [`encrypt_object`] and
//! [`decrypt_object`] add the JSON encoding on top.

use crate::symmetric::{self, Cipher, SecretKey};
use crate::CryptoError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Symmetric seal/open of opaque metadata blobs.
///
/// Both tunnel ends hold the same key; `open(seal(x)) == x` must hold.
pub trait CryptoAdapter: Send + Sync {
    /// Seal `plaintext` into a transportable blob.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if the cipher rejects the input.
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Open a blob produced by the peer's [`CryptoAdapter::seal`].
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::MalformedBlob` or `CryptoError::DecryptionFailed`.
    fn open(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Encode `value` as JSON and seal it.
///
/// # Errors
///
/// Returns `CryptoError::Serialization` if `value` cannot be encoded, or the
/// adapter's seal error.
pub fn encrypt_object<T: Serialize + ?Sized>(
    crypto: &dyn CryptoAdapter,
    value: &T,
) -> Result<Vec<u8>, CryptoError> {
    let plaintext =
        serde_json::to_vec(value).map_err(|e| CryptoError::Serialization(e.to_string()))?;
    crypto.seal(&plaintext)
}

/// Open `blob` and decode the JSON object inside.
///
/// # Errors
///
/// Returns the adapter's open error, or `CryptoError::Serialization` if the
/// plaintext is not a valid `T`.
pub fn decrypt_object<T: DeserializeOwned>(
    crypto: &dyn CryptoAdapter,
    blob: &[u8],
) -> Result<T, CryptoError> {
    let plaintext = crypto.open(blob)?;
    serde_json::from_slice(&plaintext).map_err(|e| CryptoError::Serialization(e.to_string()))
}

/// [`CryptoAdapter`] over a shared [`SecretKey`].
///
/// Always seals with the configured cipher; opens whatever cipher the blob
/// tag names, so the two ends can migrate ciphers one side at a time.
#[derive(Debug, Clone)]
pub struct SymmetricAdapter {
    key: SecretKey,
    cipher: Cipher,
}

impl SymmetricAdapter {
    /// Adapter using XChaCha20-Poly1305.
    pub fn new(key: SecretKey) -> Self {
        Self::with_cipher(key, Cipher::default())
    }

    /// Adapter sealing with `cipher`.
    pub fn with_cipher(key: SecretKey, cipher: Cipher) -> Self {
        Self { key, cipher }
    }

    /// Cipher used for sealing.
    pub fn cipher(&self) -> Cipher {
        self.cipher
    }
}

impl CryptoAdapter for SymmetricAdapter {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        symmetric::seal(&self.key, self.cipher, plaintext)
    }

    fn open(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        symmetric::open(&self.key, blob)
    }
}
