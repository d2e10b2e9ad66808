//! # Exchange Entities
//!
//! Identifiers and descriptors for one tunnelled HTTP exchange.
//!
//! ## Clusters
//!
//! - **Identity**: `ExchangeId`
//! - **Request side**: `RequestDescriptor` (encrypted into the handshake)
//! - **Response side**: `ResponseDescriptor` (encrypted by the remote peer)

use crate::errors::DescriptorError;
use crate::headers::Headers;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Status applied when a response descriptor carries no status code.
pub const DEFAULT_STATUS: u16 = 200;

// =============================================================================
// IDENTITY
// =============================================================================

/// Identifier of one exchange, unique for the lifetime of a transport.
///
/// Uses UUID v7 so identifiers sort by creation time in logs. Rendered in the
/// hyphenated form, which is also the suffix of every per-exchange channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(Uuid);

impl ExchangeId {
    /// Generate a new identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from the hyphenated (or simple) textual form.
    ///
    /// # Errors
    ///
    /// Returns `DescriptorError::InvalidExchangeId` if `s` is not a UUID.
    pub fn parse(s: &str) -> Result<Self, DescriptorError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| DescriptorError::InvalidExchangeId(s.to_string()))
    }

    /// Get the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ExchangeId {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for ExchangeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// =============================================================================
// REQUEST SIDE
// =============================================================================

/// Metadata of the inbound HTTP request, shipped encrypted in the handshake.
///
/// The body is not part of the descriptor; it streams separately as raw
/// chunks once the exchange is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    /// Exchange identifier namespacing every channel of this exchange.
    pub id: ExchangeId,
    /// HTTP method, e.g. `GET`.
    pub method: String,
    /// Target URL as received by the local proxy.
    pub url: String,
    /// Request headers in arrival order.
    #[serde(default)]
    pub headers: Headers,
}

impl RequestDescriptor {
    /// Create a descriptor with a fresh identifier.
    pub fn new(method: impl Into<String>, url: impl Into<String>, headers: Headers) -> Self {
        Self::with_id(ExchangeId::new(), method, url, headers)
    }

    /// Create a descriptor with a caller-chosen identifier.
    pub fn with_id(
        id: ExchangeId,
        method: impl Into<String>,
        url: impl Into<String>,
        headers: Headers,
    ) -> Self {
        Self {
            id,
            method: method.into(),
            url: url.into(),
            headers,
        }
    }
}

// =============================================================================
// RESPONSE SIDE
// =============================================================================

/// Response status line and headers, produced by the remote peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDescriptor {
    /// Status code; absent or zero means [`DEFAULT_STATUS`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Response headers in order.
    #[serde(default)]
    pub headers: Headers,
}

impl ResponseDescriptor {
    /// Create a descriptor with an explicit status.
    #[must_use]
    pub fn new(status_code: u16, headers: Headers) -> Self {
        Self {
            status_code: Some(status_code),
            headers,
        }
    }

    /// Status code with the default applied.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self.status_code {
            None | Some(0) => DEFAULT_STATUS,
            Some(status) => status,
        }
    }

    /// Status code with the default applied, checked against 100..=999.
    ///
    /// # Errors
    ///
    /// Returns `DescriptorError::InvalidStatusCode` outside that range.
    pub fn validated_status(&self) -> Result<u16, DescriptorError> {
        let status = self.status();
        if (100..=999).contains(&status) {
            Ok(status)
        } else {
            Err(DescriptorError::InvalidStatusCode(status))
        }
    }
}
