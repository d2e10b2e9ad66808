//! # In-Memory Transport
//!
//! Two connected [`TransportChannel`] endpoints inside one process. Each
//! endpoint runs a dispatcher task that invokes handlers sequentially in
//! wire order, so per-channel ordering holds exactly as it would over a real
//! socket.
//!
//! ## Lifecycle
//!
//! - Dropping every clone of an endpoint, or calling [`InMemoryTransport::close`],
//!   closes the connection for both sides.
//! - On close, handlers are dropped, pending calls fail with
//!   `TransportError::Closed` and the close signal fires.

use crate::events::parse_channel;
use crate::transport::{EventHandler, TransportChannel, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace, warn};

/// Handler for acknowledged calls on one channel.
///
/// The handler answers through the [`AckResponder`]; dropping it unanswered
/// leaves the caller waiting until its own deadline.
pub type CallHandler = Arc<dyn Fn(Bytes, AckResponder) + Send + Sync>;

/// What travels between the two endpoints.
enum Frame {
    Event {
        channel: String,
        payload: Bytes,
    },
    Call {
        call_id: u64,
        channel: String,
        payload: Bytes,
    },
    Ack {
        call_id: u64,
        outcome: Result<Bytes, String>,
    },
}

/// Counters for one endpoint.
#[derive(Debug, Default)]
pub struct TransportStats {
    events_emitted: AtomicU64,
    events_delivered: AtomicU64,
    events_dropped: AtomicU64,
    calls_sent: AtomicU64,
}

impl TransportStats {
    /// Events emitted by this endpoint.
    pub fn events_emitted(&self) -> u64 {
        self.events_emitted.load(Ordering::Relaxed)
    }

    /// Inbound events handed to a handler.
    pub fn events_delivered(&self) -> u64 {
        self.events_delivered.load(Ordering::Relaxed)
    }

    /// Inbound events that found no handler.
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    /// Acknowledged calls issued by this endpoint.
    pub fn calls_sent(&self) -> u64 {
        self.calls_sent.load(Ordering::Relaxed)
    }
}

/// Answers one acknowledged call.
pub struct AckResponder {
    call_id: u64,
    outbound: mpsc::UnboundedSender<Frame>,
}

impl AckResponder {
    /// Acknowledge the call with `payload`.
    pub fn accept(self, payload: Bytes) {
        self.reply(Ok(payload));
    }

    /// Refuse the call; the caller sees `TransportError::Rejected(reason)`.
    pub fn reject(self, reason: impl Into<String>) {
        self.reply(Err(reason.into()));
    }

    fn reply(self, outcome: Result<Bytes, String>) {
        let frame = Frame::Ack {
            call_id: self.call_id,
            outcome,
        };
        if self.outbound.send(frame).is_err() {
            debug!(call_id = self.call_id, "Ack dropped, transport closed");
        }
    }
}

impl std::fmt::Debug for AckResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckResponder")
            .field("call_id", &self.call_id)
            .finish()
    }
}

type PendingCalls = HashMap<u64, oneshot::Sender<Result<Bytes, TransportError>>>;

struct Endpoint {
    side: &'static str,
    handlers: RwLock<HashMap<String, EventHandler>>,
    call_handlers: RwLock<HashMap<String, CallHandler>>,
    pending: Mutex<PendingCalls>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    next_call_id: AtomicU64,
    closed: AtomicBool,
    close_signal: watch::Sender<bool>,
    stats: TransportStats,
}

impl Endpoint {
    fn new(side: &'static str, outbound: mpsc::UnboundedSender<Frame>) -> Self {
        let (close_signal, _) = watch::channel(false);
        Self {
            side,
            handlers: RwLock::new(HashMap::new()),
            call_handlers: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            outbound: Mutex::new(Some(outbound)),
            next_call_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            close_signal,
            stats: TransportStats::default(),
        }
    }

    fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let guard = self.outbound.lock();
        let sender = guard.as_ref().ok_or(TransportError::Closed)?;
        sender.send(frame).map_err(|_| TransportError::Closed)
    }

    fn deliver(&self, frame: Frame) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        match frame {
            Frame::Event { channel, payload } => {
                // Handler is cloned out so it runs without the lock held.
                let handler = self.handlers.read().get(&channel).cloned();
                match handler {
                    Some(handler) => {
                        self.stats.events_delivered.fetch_add(1, Ordering::Relaxed);
                        trace!(side = self.side, channel = %channel, len = payload.len(), "Event delivered");
                        handler(payload);
                    }
                    None => {
                        self.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
                        match parse_channel(&channel) {
                            Some((kind, id)) => debug!(
                                side = self.side,
                                exchange_id = %id,
                                kind = ?kind,
                                "Event for inactive exchange dropped"
                            ),
                            None => {
                                debug!(side = self.side, channel = %channel, "Event dropped, no listener");
                            }
                        }
                    }
                }
            }
            Frame::Call {
                call_id,
                channel,
                payload,
            } => {
                let handler = self.call_handlers.read().get(&channel).cloned();
                let outbound = self.outbound.lock().clone();
                let Some(outbound) = outbound else {
                    return;
                };
                let responder = AckResponder { call_id, outbound };
                match handler {
                    Some(handler) => handler(payload, responder),
                    None => {
                        warn!(side = self.side, channel = %channel, "Call on channel without handler");
                        responder.reject(format!("no handler for {channel}"));
                    }
                }
            }
            Frame::Ack { call_id, outcome } => {
                let waiter = self.pending.lock().remove(&call_id);
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(outcome.map_err(TransportError::Rejected));
                    }
                    None => trace!(side = self.side, call_id, "Late ack ignored"),
                }
            }
        }
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.outbound.lock().take();
        let handlers = std::mem::take(&mut *self.handlers.write());
        self.call_handlers.write().clear();
        // Dropping the senders fails every waiting call with Closed.
        let pending = std::mem::take(&mut *self.pending.lock());

        debug!(
            side = self.side,
            handlers = handlers.len(),
            pending_calls = pending.len(),
            "Transport closed"
        );

        drop(pending);
        drop(handlers);
        self.close_signal.send_replace(true);
    }
}

/// Removes a pending call entry if the caller's future is dropped.
struct PendingGuard<'a> {
    endpoint: &'a Endpoint,
    call_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.endpoint.pending.lock().remove(&self.call_id);
    }
}

async fn dispatch(endpoint: Weak<Endpoint>, mut inbound: mpsc::UnboundedReceiver<Frame>) {
    while let Some(frame) = inbound.recv().await {
        let Some(endpoint) = endpoint.upgrade() else {
            return;
        };
        endpoint.deliver(frame);
    }

    // Peer went away.
    if let Some(endpoint) = endpoint.upgrade() {
        endpoint.shutdown();
    }
}

/// One end of an in-process transport connection.
#[derive(Clone)]
pub struct InMemoryTransport {
    inner: Arc<Endpoint>,
}

impl InMemoryTransport {
    /// Create two connected endpoints `(local, remote)`.
    ///
    /// Spawns one dispatcher task per endpoint, so it must be called from
    /// within a Tokio runtime.
    pub fn pair() -> (Self, Self) {
        let (to_remote, from_local) = mpsc::unbounded_channel();
        let (to_local, from_remote) = mpsc::unbounded_channel();

        let local = Arc::new(Endpoint::new("local", to_remote));
        let remote = Arc::new(Endpoint::new("remote", to_local));

        tokio::spawn(dispatch(Arc::downgrade(&local), from_remote));
        tokio::spawn(dispatch(Arc::downgrade(&remote), from_local));

        (Self { inner: local }, Self { inner: remote })
    }

    /// Serve acknowledged calls on `channel`.
    ///
    /// # Errors
    ///
    /// - `TransportError::ChannelInUse` - a call handler already exists
    /// - `TransportError::Closed` - the connection is gone
    pub fn on_call(&self, channel: &str, handler: CallHandler) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut handlers = self.inner.call_handlers.write();
        if handlers.contains_key(channel) {
            return Err(TransportError::ChannelInUse(channel.to_string()));
        }
        handlers.insert(channel.to_string(), handler);
        Ok(())
    }

    /// Close the connection for both endpoints.
    pub fn close(&self) {
        self.inner.shutdown();
    }

    /// Whether the connection is closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of subscribed event channels.
    pub fn listener_count(&self) -> usize {
        self.inner.handlers.read().len()
    }

    /// Whether `channel` has an event handler.
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.inner.handlers.read().contains_key(channel)
    }

    /// Subscribed channel names, sorted.
    pub fn subscribed_channels(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Endpoint counters.
    pub fn stats(&self) -> &TransportStats {
        &self.inner.stats
    }
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("side", &self.inner.side)
            .field("closed", &self.is_closed())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[async_trait]
impl TransportChannel for InMemoryTransport {
    async fn call_with_ack(&self, channel: &str, payload: Bytes) -> Result<Bytes, TransportError> {
        let call_id = self.inner.next_call_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }
            self.inner.pending.lock().insert(call_id, tx);
        }
        let _guard = PendingGuard {
            endpoint: &self.inner,
            call_id,
        };

        self.inner.send(Frame::Call {
            call_id,
            channel: channel.to_string(),
            payload,
        })?;
        self.inner.stats.calls_sent.fetch_add(1, Ordering::Relaxed);

        rx.await.map_err(|_| TransportError::Closed)?
    }

    fn emit(&self, channel: &str, payload: Bytes) -> Result<(), TransportError> {
        self.inner.send(Frame::Event {
            channel: channel.to_string(),
            payload,
        })?;
        self.inner.stats.events_emitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn subscribe(&self, channel: &str, handler: EventHandler) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut handlers = self.inner.handlers.write();
        if handlers.contains_key(channel) {
            return Err(TransportError::ChannelInUse(channel.to_string()));
        }
        handlers.insert(channel.to_string(), handler);
        Ok(())
    }

    fn unsubscribe(&self, channel: &str) -> bool {
        self.inner.handlers.write().remove(channel).is_some()
    }

    fn closed(&self) -> watch::Receiver<bool> {
        self.inner.close_signal.subscribe()
    }
}
