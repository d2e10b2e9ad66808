//! Error types for the exchange bridge

use crate::domain::{ConfigError, ExchangeState, FailureReason};
use shared_bus::TransportError;
use shared_crypto::CryptoError;
use shared_types::ExchangeId;
use std::fmt;
use thiserror::Error;

/// Why the initiation call did not produce an active exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeCause {
    /// Peer refused the exchange
    Rejected(String),
    /// No acknowledgment within the handshake deadline
    TimedOut,
    /// Transport failed during the call
    Transport(TransportError),
}

impl fmt::Display for HandshakeCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeCause::Rejected(reason) => write!(f, "rejected by peer: {reason}"),
            HandshakeCause::TimedOut => f.write_str("acknowledgment timed out"),
            HandshakeCause::Transport(e) => write!(f, "{e}"),
        }
    }
}

/// Exchange bridge errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Initiation acknowledgment rejected or never received
    #[error("Handshake failed: {cause}")]
    HandshakeFailure { cause: HandshakeCause },

    /// Another active exchange already listens under this id
    #[error("Exchange id already in use: {id}")]
    ExchangeIdInUse { id: ExchangeId },

    /// Request body already ended or exchange torn down
    #[error("Exchange closed")]
    ExchangeClosed,

    /// Peer reported failure
    #[error("Remote fault: {reason}")]
    RemoteFault { reason: String },

    /// Exchange aborted locally
    #[error("Exchange aborted: {cause}")]
    LocalAbort { cause: String },

    /// Response sink failed
    #[error("Response sink fault: {reason}")]
    LocalSinkFault { reason: String },

    /// Peer broke the protocol
    #[error("Protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    /// Deadline passed
    #[error("Exchange timed out")]
    Timeout,

    /// Transport connection gone
    #[error("Transport closed")]
    TransportClosed,

    /// Other transport failure
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// Descriptor could not be sealed or opened
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Illegal lifecycle transition
    #[error("Invalid exchange transition: cannot go from {from} to {to}")]
    InvalidTransition {
        from: ExchangeState,
        to: ExchangeState,
    },

    /// Invalid bridge configuration
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl From<TransportError> for BridgeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed => BridgeError::TransportClosed,
            other => BridgeError::Transport(other),
        }
    }
}

impl From<FailureReason> for BridgeError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::RemoteFault(reason) => BridgeError::RemoteFault { reason },
            FailureReason::LocalAbort(cause) => BridgeError::LocalAbort { cause },
            FailureReason::LocalSinkFault(reason) => BridgeError::LocalSinkFault { reason },
            FailureReason::ProtocolViolation(reason) => BridgeError::ProtocolViolation { reason },
            FailureReason::Timeout => BridgeError::Timeout,
            FailureReason::TransportClosed => BridgeError::TransportClosed,
        }
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
