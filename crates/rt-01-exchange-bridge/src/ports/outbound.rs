//! Driven Ports (SPI - Outbound)
//!
//! The bridge replays the remote response through [`ResponseSink`]. The
//! transport and crypto ports live in `shared-bus` and `shared-crypto`.

use async_trait::async_trait;
use bytes::Bytes;
use shared_types::Headers;
use thiserror::Error;

/// Errors raised by a response sink
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The HTTP side is gone (client disconnected)
    #[error("Response sink closed")]
    Closed,

    /// Write after `end()`
    #[error("Response already ended")]
    AlreadyEnded,

    /// Head written twice
    #[error("Response head already written")]
    HeadAlreadyWritten,

    /// Underlying server error
    #[error("Response sink I/O error: {0}")]
    Io(String),
}

/// Outbound HTTP response of one exchange.
///
/// Driven by exactly one task; calls arrive in protocol order: at most one
/// head (`set_status_and_headers` or `set_status`), any number of body
/// writes, then `end()` once.
#[async_trait]
pub trait ResponseSink: Send {
    /// Commit status and headers.
    async fn set_status_and_headers(&mut self, status: u16, headers: &Headers)
        -> Result<(), SinkError>;

    /// Commit a status with no headers (fault path).
    async fn set_status(&mut self, status: u16) -> Result<(), SinkError>;

    /// Write body bytes.
    async fn write_body(&mut self, chunk: Bytes) -> Result<(), SinkError>;

    /// Finish the response.
    async fn end(&mut self) -> Result<(), SinkError>;
}
