//! # Listener Sets
//!
//! Registration record for all the channels one exchange listens on.
//! Registration is all-or-nothing and removal happens exactly once, either
//! through [`ListenerSet::release`] or when the set is dropped.

use crate::transport::{EventHandler, TransportChannel, TransportError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Channels subscribed on behalf of one owner.
pub struct ListenerSet {
    /// Transport the channels are registered on.
    transport: Arc<dyn TransportChannel>,

    /// Registered channel names; `None` once released.
    channels: Option<Vec<String>>,
}

impl ListenerSet {
    /// Subscribe every `(channel, handler)` pair.
    ///
    /// If any subscription fails, the ones already made are removed before
    /// the error is returned, so a failed registration leaves nothing behind.
    ///
    /// # Errors
    ///
    /// Returns the first subscription error.
    pub fn register(
        transport: Arc<dyn TransportChannel>,
        listeners: Vec<(String, EventHandler)>,
    ) -> Result<Self, TransportError> {
        let mut registered: Vec<String> = Vec::with_capacity(listeners.len());

        for (channel, handler) in listeners {
            if let Err(e) = transport.subscribe(&channel, handler) {
                for done in &registered {
                    transport.unsubscribe(done);
                }
                warn!(
                    channel = %channel,
                    rolled_back = registered.len(),
                    error = %e,
                    "Listener registration failed"
                );
                return Err(e);
            }
            registered.push(channel);
        }

        debug!(count = registered.len(), "Listeners registered");

        Ok(Self {
            transport,
            channels: Some(registered),
        })
    }

    /// Registered channel names (empty once released).
    #[must_use]
    pub fn channels(&self) -> &[String] {
        self.channels.as_deref().unwrap_or(&[])
    }

    /// Whether the set was already released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.channels.is_none()
    }

    /// Unsubscribe every channel. Returns how many handlers the transport
    /// actually removed; a second call does nothing and returns 0.
    pub fn release(&mut self) -> usize {
        let Some(channels) = self.channels.take() else {
            return 0;
        };

        let removed = channels
            .iter()
            .filter(|channel| self.transport.unsubscribe(channel))
            .count();

        debug!(
            registered = channels.len(),
            removed = removed,
            "Listeners released"
        );
        removed
    }
}

impl Drop for ListenerSet {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("channels", &self.channels)
            .finish()
    }
}
