//! How an exchange ended.

use thiserror::Error;

/// Status set on the sink when a failure happens before any headers were
/// written and the failure is attributable to the peer or this process.
pub const STATUS_SERVER_FAULT: u16 = 500;
/// Status for a peer that broke the protocol or vanished.
pub const STATUS_BAD_GATEWAY: u16 = 502;
/// Status for a peer that never answered in time.
pub const STATUS_GATEWAY_TIMEOUT: u16 = 504;

/// Why an active exchange failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// Peer sent response-error
    #[error("remote fault: {0}")]
    RemoteFault(String),

    /// Local caller aborted
    #[error("aborted: {0}")]
    LocalAbort(String),

    /// Response sink failed or stalled
    #[error("response sink fault: {0}")]
    LocalSinkFault(String),

    /// Peer sent something undecryptable or overran its window
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Idle or absolute deadline passed
    #[error("timed out")]
    Timeout,

    /// The shared transport went away
    #[error("transport closed")]
    TransportClosed,
}

impl FailureReason {
    /// Status to apply when headers were not yet written.
    pub fn fault_status(&self) -> u16 {
        match self {
            FailureReason::RemoteFault(_)
            | FailureReason::LocalAbort(_)
            | FailureReason::LocalSinkFault(_) => STATUS_SERVER_FAULT,
            FailureReason::ProtocolViolation(_) | FailureReason::TransportClosed => {
                STATUS_BAD_GATEWAY
            }
            FailureReason::Timeout => STATUS_GATEWAY_TIMEOUT,
        }
    }

    /// Whether this side decided the failure, so the peer must be told.
    pub fn is_locally_originated(&self) -> bool {
        matches!(
            self,
            FailureReason::LocalAbort(_)
                | FailureReason::LocalSinkFault(_)
                | FailureReason::ProtocolViolation(_)
                | FailureReason::Timeout
        )
    }
}

/// Terminal result of an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Response ended normally.
    Completed,
    /// Exchange failed.
    Failed(FailureReason),
}

impl ExchangeOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ExchangeOutcome::Completed)
    }

    /// Failure reason, if failed.
    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            ExchangeOutcome::Completed => None,
            ExchangeOutcome::Failed(reason) => Some(reason),
        }
    }
}
