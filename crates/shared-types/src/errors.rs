//! # Error Types
//!
//! Errors raised while building or validating exchange descriptors.

use thiserror::Error;

/// Errors that can occur when constructing descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// The exchange identifier is not a valid UUID.
    #[error("Invalid exchange id: {0}")]
    InvalidExchangeId(String),

    /// Header name is empty or contains characters forbidden in a token.
    #[error("Invalid header name: {0:?}")]
    InvalidHeaderName(String),

    /// Header value contains CR, LF or NUL.
    #[error("Invalid value for header {name}")]
    InvalidHeaderValue { name: String },

    /// Status code outside the three-digit HTTP range.
    #[error("Invalid status code: {0}")]
    InvalidStatusCode(u16),
}
