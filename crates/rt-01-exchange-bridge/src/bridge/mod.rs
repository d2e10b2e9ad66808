//! # Exchange Bridge
//!
//! One instance per HTTP exchange. Opening registers the response-side
//! listeners, performs the acknowledged handshake and spawns the owner task
//! that replays the response into the sink. The returned handle carries the
//! request body.
//!
//! ## Flow
//!
//! ```text
//! open ──register listeners──→ call_with_ack(exchange-init) ──ack──→ ACTIVE
//!   │                                  │
//!   │                                  └──reject / timeout──→ rollback, OpenFailure
//!   ↓
//! submit_chunk / end_body ──→ exchange-chunk-{id} / exchange-end-{id}
//! owner task ←── exchange-response-{headers,chunk,end,error}-{id}
//! ```

mod inbox;
mod owner;

use crate::domain::{
    BridgeConfig, ExchangeOutcome, ExchangeState, ExchangeStats, FailureReason, RequestCredit,
    ResponseWindow, StateCell,
};
use crate::error::{BridgeError, HandshakeCause};
use crate::ports::outbound::ResponseSink;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use owner::{OwnerTask, Signals};
use shared_bus::{
    ChannelSet, ExchangeChannel, ListenerSet, TransportChannel, TransportError, INIT_CHANNEL,
};
use shared_crypto::{encrypt_object, CryptoAdapter};
use shared_types::{ExchangeId, RequestDescriptor};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Returned by a failed open. The sink comes back untouched so the caller
/// can answer the client itself.
pub struct OpenFailure {
    pub error: BridgeError,
    pub sink: Box<dyn ResponseSink>,
}

impl OpenFailure {
    fn new(error: BridgeError, sink: Box<dyn ResponseSink>) -> Self {
        Self { error, sink }
    }

    /// Drop the sink and keep the error.
    pub fn into_error(self) -> BridgeError {
        self.error
    }
}

impl fmt::Debug for OpenFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenFailure")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for OpenFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for OpenFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Cloneable trigger for aborting an exchange from another task.
#[derive(Clone)]
pub struct AbortHandle {
    id: ExchangeId,
    signal: Arc<watch::Sender<Option<String>>>,
    state: StateCell,
}

impl AbortHandle {
    /// Request an abort. Returns `false` if the exchange already ended or an
    /// abort was already requested; only the first cause is kept.
    pub fn abort(&self, cause: impl Into<String>) -> bool {
        if self.state.get().is_terminal() {
            return false;
        }
        let cause = cause.into();
        let recorded = self.signal.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(cause.clone());
            true
        });
        if recorded {
            debug!(exchange_id = %self.id, cause = %cause, "Abort requested");
        }
        recorded
    }

    /// Whether an abort was requested.
    pub fn is_requested(&self) -> bool {
        self.signal.borrow().is_some()
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortHandle")
            .field("id", &self.id)
            .field("requested", &self.is_requested())
            .finish()
    }
}

/// Handle of one active exchange.
pub struct ExchangeBridge {
    id: ExchangeId,
    channels: ChannelSet,
    transport: Arc<dyn TransportChannel>,
    state: StateCell,
    credit: Option<Arc<RequestCredit>>,
    max_chunk_bytes: usize,
    body_ended: bool,
    abort: AbortHandle,
    outcome: watch::Receiver<Option<ExchangeOutcome>>,
}

impl ExchangeBridge {
    /// Open an exchange with default configuration.
    ///
    /// # Errors
    ///
    /// See [`ExchangeBridge::open_with`].
    pub async fn open(
        crypto: Arc<dyn CryptoAdapter>,
        request: RequestDescriptor,
        transport: Arc<dyn TransportChannel>,
        sink: Box<dyn ResponseSink>,
    ) -> Result<Self, OpenFailure> {
        Self::open_with(
            crypto,
            request,
            transport,
            sink,
            BridgeConfig::default(),
            Arc::new(ExchangeStats::default()),
        )
        .await
    }

    /// Open an exchange.
    ///
    /// Listeners are registered before the handshake so no response event
    /// can be missed. If the handshake fails, or this future is dropped
    /// before it resolves, every listener is removed again.
    ///
    /// # Errors
    ///
    /// - `BridgeError::Config` - invalid `config`
    /// - `BridgeError::Crypto` - the descriptor could not be sealed
    /// - `BridgeError::ExchangeIdInUse` - the id is active on `transport`
    /// - `BridgeError::HandshakeFailure` - ack rejected, timed out or lost
    /// - `BridgeError::TransportClosed` - the transport is gone
    pub async fn open_with(
        crypto: Arc<dyn CryptoAdapter>,
        request: RequestDescriptor,
        transport: Arc<dyn TransportChannel>,
        sink: Box<dyn ResponseSink>,
        config: BridgeConfig,
        stats: Arc<ExchangeStats>,
    ) -> Result<Self, OpenFailure> {
        if let Err(e) = config.validate() {
            return Err(OpenFailure::new(e.into(), sink));
        }

        let id = request.id;
        let channels = ChannelSet::new(id);
        let state = StateCell::new();

        let blob = match encrypt_object(crypto.as_ref(), &request) {
            Ok(blob) => Bytes::from(blob),
            Err(e) => return Err(OpenFailure::new(e.into(), sink)),
        };

        let window = Arc::new(if config.flow_control {
            ResponseWindow::bounded(config.response_window_bytes)
        } else {
            ResponseWindow::unbounded()
        });
        let (handlers, inbox) = inbox::listeners(&channels, &window, config.flow_control);

        let listeners = match ListenerSet::register(transport.clone(), handlers) {
            Ok(listeners) => listeners,
            Err(e) => {
                let error = match e {
                    TransportError::ChannelInUse(_) => BridgeError::ExchangeIdInUse { id },
                    other => BridgeError::from(other),
                };
                warn!(exchange_id = %id, error = %error, "Exchange listeners not registered");
                return Err(OpenFailure::new(error, sink));
            }
        };

        debug!(
            exchange_id = %id,
            method = %request.method,
            url = %request.url,
            listeners = listeners.channels().len(),
            "Initiating exchange"
        );

        let ack = timeout(
            config.handshake_timeout(),
            transport.call_with_ack(INIT_CHANNEL, blob),
        )
        .await;

        let cause = match ack {
            Ok(Ok(_)) => None,
            Ok(Err(TransportError::Rejected(reason))) => Some(HandshakeCause::Rejected(reason)),
            Ok(Err(e)) => Some(HandshakeCause::Transport(e)),
            Err(_) => Some(HandshakeCause::TimedOut),
        };

        if let Some(cause) = cause {
            drop(listeners);
            if cause == HandshakeCause::TimedOut {
                // The peer may still accept late; tell it to drop the exchange.
                let channel = channels.name(ExchangeChannel::RequestAbort);
                if let Err(e) = transport.emit(channel, Bytes::from_static(b"handshake timed out")) {
                    debug!(channel = %channel, error = %e, "Handshake abort not sent");
                }
            }
            if let Err(e) = state.advance(ExchangeState::Failed) {
                warn!(exchange_id = %id, error = %e, "Unexpected lifecycle transition");
            }
            stats.record_handshake_failure();
            warn!(exchange_id = %id, cause = %cause, "Handshake failed");
            return Err(OpenFailure::new(BridgeError::HandshakeFailure { cause }, sink));
        }

        if let Err(e) = state.advance(ExchangeState::Active) {
            return Err(OpenFailure::new(e, sink));
        }
        stats.record_opened();
        info!(exchange_id = %id, "Exchange active");

        let credit = config
            .flow_control
            .then(|| Arc::new(RequestCredit::new(config.request_window_bytes)));
        let (abort_tx, abort_rx) = watch::channel(None);
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let max_chunk_bytes = config.max_chunk_bytes as usize;

        let owner = OwnerTask {
            channels: channels.clone(),
            transport: transport.clone(),
            crypto,
            sink,
            listeners,
            inbox,
            signals: Signals::new(abort_rx, transport.closed()),
            state: state.clone(),
            credit: credit.clone(),
            window,
            config,
            stats,
            outcome: outcome_tx,
            head_written: false,
        };
        tokio::spawn(owner.run());

        Ok(Self {
            id,
            channels,
            transport,
            state: state.clone(),
            credit,
            max_chunk_bytes,
            body_ended: false,
            abort: AbortHandle {
                id,
                signal: Arc::new(abort_tx),
                state,
            },
            outcome: outcome_rx,
        })
    }

    /// Exchange identifier.
    pub fn id(&self) -> ExchangeId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ExchangeState {
        self.state.get()
    }

    fn is_closed(&self) -> bool {
        self.state.get().is_terminal() || self.abort.is_requested()
    }

    /// Send request body bytes, split into pieces of at most
    /// `max_chunk_bytes`. With flow control, waits for credit before each
    /// piece. Empty input sends nothing.
    ///
    /// # Errors
    ///
    /// - `BridgeError::ExchangeClosed` - body already ended, or the exchange
    ///   was aborted or torn down (also while waiting for credit)
    /// - `BridgeError::TransportClosed` - the transport is gone
    pub async fn submit_chunk(&mut self, chunk: Bytes) -> Result<(), BridgeError> {
        if self.body_ended || self.is_closed() {
            return Err(BridgeError::ExchangeClosed);
        }

        let mut rest = chunk;
        while !rest.is_empty() {
            let take = rest.len().min(self.max_chunk_bytes);
            let piece = rest.split_to(take);

            if let Some(credit) = &self.credit {
                // take <= max_chunk_bytes, which came from a u32
                credit.acquire(take as u32).await?;
            }
            if self.is_closed() {
                return Err(BridgeError::ExchangeClosed);
            }

            self.transport
                .emit(self.channels.name(ExchangeChannel::RequestChunk), piece)?;
        }
        Ok(())
    }

    /// Signal the end of the request body.
    ///
    /// Returns `Ok(true)` when the end signal was sent, `Ok(false)` if it was
    /// already sent or the exchange is over.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::TransportClosed` if the transport is gone.
    pub fn end_body(&mut self) -> Result<bool, BridgeError> {
        if self.body_ended || self.is_closed() {
            return Ok(false);
        }
        self.body_ended = true;
        self.transport
            .emit(self.channels.name(ExchangeChannel::RequestEnd), Bytes::new())?;
        debug!(exchange_id = %self.id, "Request body ended");
        Ok(true)
    }

    /// Submit every chunk of `body`, then end it. A stream error aborts the
    /// exchange.
    ///
    /// # Errors
    ///
    /// - `BridgeError::LocalAbort` - the stream failed
    /// - any error of [`ExchangeBridge::submit_chunk`]
    pub async fn relay_body<S, E>(&mut self, body: S) -> Result<(), BridgeError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: fmt::Display,
    {
        futures::pin_mut!(body);

        while let Some(item) = body.next().await {
            match item {
                Ok(chunk) => self.submit_chunk(chunk).await?,
                Err(e) => {
                    let cause = format!("request body failed: {e}");
                    self.abort(cause.clone());
                    return Err(BridgeError::LocalAbort { cause });
                }
            }
        }

        self.end_body()?;
        Ok(())
    }

    /// Abort the exchange. No-op once it has ended.
    pub fn abort(&self, cause: impl Into<String>) -> bool {
        self.abort.abort(cause)
    }

    /// Handle for aborting from elsewhere.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Outcome, if the exchange has ended.
    pub fn outcome(&self) -> Option<ExchangeOutcome> {
        self.outcome.borrow().clone()
    }

    /// Wait for the exchange to end.
    pub async fn finished(&self) -> ExchangeOutcome {
        let mut outcome = self.outcome.clone();
        let result = outcome
            .wait_for(Option::is_some)
            .await
            .map(|slot| slot.clone());
        match result {
            Ok(Some(outcome)) => outcome,
            // Owner task vanished without publishing (runtime shutdown).
            _ => ExchangeOutcome::Failed(FailureReason::LocalAbort(
                "exchange owner stopped".into(),
            )),
        }
    }
}

impl fmt::Debug for ExchangeBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeBridge")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("body_ended", &self.body_ended)
            .finish()
    }
}
