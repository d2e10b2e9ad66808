//! # Transport Channel
//!
//! The one shared duplex connection every exchange is multiplexed over.
//! Implementations deliver events for a channel name to at most one handler
//! and preserve emission order on the wire.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Handler invoked for every event on a subscribed channel.
///
/// Runs on the transport's dispatcher; it must not block.
pub type EventHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Errors from transport operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection is closed.
    #[error("Transport closed")]
    Closed,

    /// Another listener already owns this channel name.
    #[error("Channel already subscribed: {0}")]
    ChannelInUse(String),

    /// The peer answered an acknowledged call with a rejection.
    #[error("Call rejected by peer: {0}")]
    Rejected(String),
}

/// Shared duplex connection supporting acknowledged calls, fire-and-forget
/// events, and named subscriptions.
#[async_trait]
pub trait TransportChannel: Send + Sync {
    /// Send `payload` on `channel` and wait for the peer's acknowledgment.
    ///
    /// Not bounded in time; callers wrap it in a timeout.
    ///
    /// # Errors
    ///
    /// - `TransportError::Rejected` - the peer refused the call
    /// - `TransportError::Closed` - the connection went away before the ack
    async fn call_with_ack(&self, channel: &str, payload: Bytes) -> Result<Bytes, TransportError>;

    /// Emit an event without waiting for delivery.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Closed` if the connection is gone.
    fn emit(&self, channel: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Route every event on `channel` to `handler`.
    ///
    /// # Errors
    ///
    /// - `TransportError::ChannelInUse` - the name already has a handler
    /// - `TransportError::Closed` - the connection is gone
    fn subscribe(&self, channel: &str, handler: EventHandler) -> Result<(), TransportError>;

    /// Remove the handler for `channel`. Returns whether one was removed.
    fn unsubscribe(&self, channel: &str) -> bool;

    /// Close signal; the value flips to `true` once the connection is gone.
    fn closed(&self) -> watch::Receiver<bool>;
}
