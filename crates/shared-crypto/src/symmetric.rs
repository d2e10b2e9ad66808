//! # Symmetric Encryption
//!
//! Provides XChaCha20-Poly1305 (default) and AES-GCM sealing into
//! self-describing blobs.
//!
//! ## Security Properties
//!
//! - **XChaCha20-Poly1305**: 192-bit nonce, constant-time ARX design
//! - **AES-GCM**: Use only with AES-NI hardware acceleration

use crate::CryptoError;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use zeroize::Zeroize;

/// Key length in bytes for both ciphers.
pub const KEY_LEN: usize = 32;

/// Secret key (256-bit).
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex string.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyEncoding` for non-hex input and
    /// `CryptoError::InvalidKeyLength` when it does not decode to 32 bytes.
    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let mut decoded = hex::decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        if decoded.len() != KEY_LEN {
            let actual = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                actual,
            });
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self(bytes))
    }

    /// Generate random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// Get inner bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Cipher selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Cipher {
    /// XChaCha20-Poly1305 (default, side-channel immune)
    #[default]
    XChaCha20Poly1305,
    /// AES-256-GCM (use with AES-NI only)
    Aes256Gcm,
}

impl Cipher {
    /// Leading byte identifying the cipher inside a blob.
    pub fn tag(self) -> u8 {
        match self {
            Cipher::XChaCha20Poly1305 => 0x01,
            Cipher::Aes256Gcm => 0x02,
        }
    }

    /// Resolve a blob tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Cipher::XChaCha20Poly1305),
            0x02 => Some(Cipher::Aes256Gcm),
            _ => None,
        }
    }

    /// Nonce length in bytes.
    pub fn nonce_len(self) -> usize {
        match self {
            Cipher::XChaCha20Poly1305 => 24,
            Cipher::Aes256Gcm => 12,
        }
    }
}

fn random_nonce(len: usize) -> Vec<u8> {
    let mut nonce = vec![0u8; len];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce);
    nonce
}

/// Seal plaintext into `tag ‖ nonce ‖ ciphertext` with a fresh random nonce.
///
/// # Errors
///
/// Returns `CryptoError::EncryptionFailed` if encryption fails.
pub fn seal(key: &SecretKey, cipher: Cipher, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce = random_nonce(cipher.nonce_len());

    let ciphertext = match cipher {
        Cipher::XChaCha20Poly1305 => XChaCha20Poly1305::new(key.as_bytes().into())
            .encrypt(XNonce::from_slice(&nonce), plaintext),
        Cipher::Aes256Gcm => Aes256Gcm::new(key.as_bytes().into())
            .encrypt(GenericArray::from_slice(&nonce), plaintext),
    }
    .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut blob = Vec::with_capacity(1 + nonce.len() + ciphertext.len());
    blob.push(cipher.tag());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Open a blob produced by [`seal`]. The cipher is read from the blob tag.
///
/// # Errors
///
/// Returns `CryptoError::MalformedBlob` for a truncated blob or unknown tag,
/// and `CryptoError::DecryptionFailed` if authentication fails.
pub fn open(key: &SecretKey, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let (&tag, rest) = blob
        .split_first()
        .ok_or_else(|| CryptoError::MalformedBlob("empty blob".into()))?;
    let cipher = Cipher::from_tag(tag)
        .ok_or_else(|| CryptoError::MalformedBlob(format!("unknown cipher tag {tag:#04x}")))?;
    if rest.len() < cipher.nonce_len() {
        return Err(CryptoError::MalformedBlob(format!(
            "blob of {} bytes shorter than nonce",
            blob.len()
        )));
    }
    let (nonce, ciphertext) = rest.split_at(cipher.nonce_len());

    match cipher {
        Cipher::XChaCha20Poly1305 => XChaCha20Poly1305::new(key.as_bytes().into())
            .decrypt(XNonce::from_slice(nonce), ciphertext),
        Cipher::Aes256Gcm => Aes256Gcm::new(key.as_bytes().into())
            .decrypt(GenericArray::from_slice(nonce), ciphertext),
    }
    .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}
