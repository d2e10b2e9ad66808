//! Credit windows.
//!
//! ## Request direction
//!
//! [`RequestCredit`] starts with the configured window. Each piece of request
//! body consumes its length; the peer tops the window up with grants.
//! Closing the window wakes every waiter with `ExchangeClosed`.
//!
//! ## Response direction
//!
//! [`ResponseWindow`] counts bytes received from the peer and not yet written
//! to the sink. Exceeding the limit means the peer ignored its credit.

use crate::error::BridgeError;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

/// Request-body credit, in bytes.
#[derive(Debug)]
pub struct RequestCredit {
    permits: Semaphore,
}

impl RequestCredit {
    /// Window holding `initial` bytes of credit.
    pub fn new(initial: u32) -> Self {
        Self {
            permits: Semaphore::new(initial as usize),
        }
    }

    /// Take `len` bytes of credit, waiting until the peer has granted enough.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::ExchangeClosed` once the window is closed.
    pub async fn acquire(&self, len: u32) -> Result<(), BridgeError> {
        if len == 0 {
            return Ok(());
        }
        let permit = self
            .permits
            .acquire_many(len)
            .await
            .map_err(|_| BridgeError::ExchangeClosed)?;
        permit.forget();
        Ok(())
    }

    /// Add credit from a peer grant. Grants beyond the semaphore's capacity
    /// are clamped.
    pub fn grant(&self, bytes: u32) {
        let room = Semaphore::MAX_PERMITS.saturating_sub(self.permits.available_permits());
        self.permits.add_permits((bytes as usize).min(room));
    }

    /// Credit currently available.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Close the window; pending and future acquisitions fail.
    pub fn close(&self) {
        self.permits.close();
    }

    /// Whether the window was closed.
    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}

/// Response bytes in flight between the transport and the sink.
#[derive(Debug)]
pub struct ResponseWindow {
    limit: Option<usize>,
    buffered: AtomicUsize,
}

impl ResponseWindow {
    /// Window that overflows past `limit` bytes.
    pub fn bounded(limit: u32) -> Self {
        Self {
            limit: Some(limit as usize),
            buffered: AtomicUsize::new(0),
        }
    }

    /// Window that only counts.
    pub fn unbounded() -> Self {
        Self {
            limit: None,
            buffered: AtomicUsize::new(0),
        }
    }

    /// Record `len` received bytes.
    ///
    /// Returns the new buffered total, as `Err` when that exceeds the limit.
    pub fn receive(&self, len: usize) -> Result<usize, usize> {
        let buffered = self.buffered.fetch_add(len, Ordering::AcqRel) + len;
        match self.limit {
            Some(limit) if buffered > limit => Err(buffered),
            _ => Ok(buffered),
        }
    }

    /// Record `len` bytes written to the sink.
    pub fn release(&self, len: usize) {
        // fetch_update keeps the counter from wrapping below zero.
        let _ = self
            .buffered
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(len))
            });
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    /// Overflow limit, if bounded.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}
