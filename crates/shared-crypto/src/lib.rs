//! # Shared Crypto - Metadata Encryption
//!
//! Seals the structured metadata of a tunnelled exchange (request and
//! response descriptors) into opaque blobs and opens them again on the other
//! side. Body chunks are not handled here.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `symmetric` | XChaCha20-Poly1305, AES-GCM | Raw AEAD seal/open |
//! | `adapter` | JSON + `symmetric` | Descriptor encryption port |
//!
//! ## Blob Layout
//!
//! ```text
//! ┌─────────┬──────────────────────┬──────────────────────────┐
//! │ tag (1) │ nonce (24 or 12)     │ ciphertext + auth tag    │
//! └─────────┴──────────────────────┴──────────────────────────┘
//! ```
//!
//! ## Security Properties
//!
//! - **XChaCha20**: 192-bit random nonce per blob, constant-time
//! - **AES-GCM**: 96-bit random nonce, use only with AES-NI
//! - **Keys**: zeroized on drop

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod errors;
pub mod symmetric;

// Re-exports
pub use adapter::{decrypt_object, encrypt_object, CryptoAdapter, SymmetricAdapter};
pub use errors::CryptoError;
pub use symmetric::{open, seal, Cipher, SecretKey};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
