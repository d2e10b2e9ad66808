//! Exchange lifecycle.
//!
//! ```text
//! [INITIATING] ──ack──→ [ACTIVE] ──response-end──→ [COMPLETED]
//!       │                  │
//!       │                  └──error / abort / timeout / fault──→ [FAILED]
//!       └──handshake failure───────────────────────────────────→ [FAILED]
//! ```

use crate::error::BridgeError;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeState {
    /// Listeners registered, waiting for the handshake acknowledgment
    Initiating,
    /// Handshake acknowledged, bodies flowing
    Active,
    /// Response ended normally
    Completed,
    /// Exchange failed
    Failed,
}

impl ExchangeState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, ExchangeState::Completed | ExchangeState::Failed)
    }

    /// Check that `self → to` is a legal transition.
    pub fn transition(self, to: ExchangeState) -> Result<ExchangeState, BridgeError> {
        let allowed = matches!(
            (self, to),
            (ExchangeState::Initiating, ExchangeState::Active)
                | (ExchangeState::Initiating, ExchangeState::Failed)
                | (ExchangeState::Active, ExchangeState::Completed)
                | (ExchangeState::Active, ExchangeState::Failed)
        );

        if allowed {
            Ok(to)
        } else {
            Err(BridgeError::InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeState::Initiating => "INITIATING",
            ExchangeState::Active => "ACTIVE",
            ExchangeState::Completed => "COMPLETED",
            ExchangeState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Shared state slot. The owner of the exchange advances it; handles read it.
#[derive(Debug, Clone)]
pub struct StateCell {
    inner: Arc<RwLock<ExchangeState>>,
}

impl StateCell {
    /// New cell in `INITIATING`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ExchangeState::Initiating)),
        }
    }

    /// Current state.
    pub fn get(&self) -> ExchangeState {
        *self.inner.read()
    }

    /// Apply a transition, returning the previous state.
    pub fn advance(&self, to: ExchangeState) -> Result<ExchangeState, BridgeError> {
        let mut state = self.inner.write();
        let from = *state;
        *state = from.transition(to)?;
        Ok(from)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
