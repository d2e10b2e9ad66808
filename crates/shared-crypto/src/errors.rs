//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Invalid key length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes
        expected: usize,
        /// Actual key length in bytes
        actual: usize,
    },

    /// Invalid hex encoding for key material
    #[error("Invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    /// Sealed blob too short or tagged with an unknown cipher
    #[error("Malformed sealed blob: {0}")]
    MalformedBlob(String),

    /// Object could not be encoded or decoded
    #[error("Serialization failed: {0}")]
    Serialization(String),
}
