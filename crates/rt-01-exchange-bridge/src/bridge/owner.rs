//! Owner task of one active exchange.
//!
//! The owner is the only writer of the response sink and of the exchange
//! state after activation. It drains the inbox until a terminal event, an
//! abort, a deadline or transport loss, then tears down. `run` consumes the
//! task, so teardown happens once.
//!
//! Sink writes inside the loop race the same abort, transport and absolute
//! deadline signals, so a stalled client cannot delay them.

use super::inbox::{Inbox, InboxEvent};
use crate::domain::{
    BridgeConfig, ExchangeOutcome, ExchangeState, ExchangeStats, FailureReason, RequestCredit,
    ResponseWindow, StateCell,
};
use crate::ports::outbound::{ResponseSink, SinkError};
use bytes::Bytes;
use shared_bus::{decode_credit, encode_credit, ChannelSet, ExchangeChannel, ListenerSet, TransportChannel};
use shared_crypto::{decrypt_object, CryptoAdapter};
use shared_types::{Headers, ResponseDescriptor, DEFAULT_STATUS};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::sync::watch::error::RecvError;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, trace, warn};

enum Step {
    Continue,
    Complete,
}

/// Signals that end an exchange regardless of what the peer sends.
pub(crate) struct Signals {
    abort: watch::Receiver<Option<String>>,
    abort_open: bool,
    transport_closed: watch::Receiver<bool>,
    hard_deadline: Option<Instant>,
}

impl Signals {
    pub(crate) fn new(
        abort: watch::Receiver<Option<String>>,
        transport_closed: watch::Receiver<bool>,
    ) -> Self {
        Self {
            abort,
            abort_open: true,
            transport_closed,
            hard_deadline: None,
        }
    }

    fn on_abort_changed(&mut self, changed: Result<(), RecvError>) -> Option<FailureReason> {
        if changed.is_err() {
            // Every handle dropped; nobody can abort any more.
            self.abort_open = false;
            return None;
        }
        self.abort
            .borrow_and_update()
            .clone()
            .map(FailureReason::LocalAbort)
    }

    /// Resolves with the first abort, transport loss or absolute deadline.
    async fn interrupted(&mut self) -> FailureReason {
        loop {
            tokio::select! {
                biased;

                changed = self.abort.changed(), if self.abort_open => {
                    if let Some(reason) = self.on_abort_changed(changed) {
                        return reason;
                    }
                }

                () = transport_gone(&mut self.transport_closed) => {
                    return FailureReason::TransportClosed;
                }

                () = until(self.hard_deadline) => {
                    return FailureReason::Timeout;
                }
            }
        }
    }
}

pub(crate) struct OwnerTask {
    pub(crate) channels: ChannelSet,
    pub(crate) transport: Arc<dyn TransportChannel>,
    pub(crate) crypto: Arc<dyn CryptoAdapter>,
    pub(crate) sink: Box<dyn ResponseSink>,
    pub(crate) listeners: ListenerSet,
    pub(crate) inbox: Inbox,
    pub(crate) signals: Signals,
    pub(crate) state: StateCell,
    pub(crate) credit: Option<Arc<RequestCredit>>,
    pub(crate) window: Arc<ResponseWindow>,
    pub(crate) config: BridgeConfig,
    pub(crate) stats: Arc<ExchangeStats>,
    pub(crate) outcome: watch::Sender<Option<ExchangeOutcome>>,
    pub(crate) head_written: bool,
}

impl OwnerTask {
    pub(crate) async fn run(mut self) {
        let idle = self.config.idle_timeout();
        self.signals.hard_deadline = self
            .config
            .max_exchange_duration()
            .map(|limit| Instant::now() + limit);
        let mut idle_deadline = Instant::now() + idle;

        if self.config.flow_control {
            self.emit(
                ExchangeChannel::ResponseCredit,
                encode_credit(self.config.response_window_bytes),
            );
        }

        let result = loop {
            let deadline = self
                .signals
                .hard_deadline
                .map_or(idle_deadline, |hard| hard.min(idle_deadline));

            tokio::select! {
                biased;

                changed = self.signals.abort.changed(), if self.signals.abort_open => {
                    if let Some(reason) = self.signals.on_abort_changed(changed) {
                        break Err(reason);
                    }
                }

                event = self.inbox.recv() => {
                    let Some(event) = event else {
                        break Err(FailureReason::TransportClosed);
                    };
                    idle_deadline = Instant::now() + idle;
                    match self.handle(event).await {
                        Ok(Step::Continue) => {}
                        Ok(Step::Complete) => break Ok(()),
                        Err(reason) => break Err(reason),
                    }
                }

                () = transport_gone(&mut self.signals.transport_closed) => {
                    break Err(FailureReason::TransportClosed);
                }

                () = sleep_until(deadline) => {
                    break Err(FailureReason::Timeout);
                }
            }
        };

        self.teardown(result).await;
    }

    async fn handle(&mut self, event: InboxEvent) -> Result<Step, FailureReason> {
        match event {
            InboxEvent::Headers(payload) => {
                self.on_headers(&payload).await?;
                Ok(Step::Continue)
            }
            InboxEvent::Chunk(chunk) => {
                self.on_chunk(chunk).await?;
                Ok(Step::Continue)
            }
            InboxEvent::Credit(payload) => {
                self.on_credit(&payload)?;
                Ok(Step::Continue)
            }
            InboxEvent::End => Ok(Step::Complete),
            InboxEvent::Error(payload) => Err(FailureReason::RemoteFault(
                String::from_utf8_lossy(&payload).into_owned(),
            )),
            InboxEvent::Overflow { buffered } => Err(FailureReason::ProtocolViolation(format!(
                "peer overran response window: {buffered} bytes buffered, window {}",
                self.config.response_window_bytes
            ))),
        }
    }

    async fn on_headers(&mut self, payload: &[u8]) -> Result<(), FailureReason> {
        if self.head_written {
            warn!(
                exchange_id = %self.channels.id(),
                "Duplicate response headers ignored"
            );
            return Ok(());
        }

        let descriptor: ResponseDescriptor = decrypt_object(self.crypto.as_ref(), payload)
            .map_err(|e| {
                FailureReason::ProtocolViolation(format!("undecryptable response headers: {e}"))
            })?;
        let status = descriptor
            .validated_status()
            .map_err(|e| FailureReason::ProtocolViolation(e.to_string()))?;

        let limit = self.config.idle_timeout();
        guarded(
            limit,
            self.sink.set_status_and_headers(status, &descriptor.headers),
            &mut self.signals,
        )
        .await?;
        self.head_written = true;

        debug!(
            exchange_id = %self.channels.id(),
            status = status,
            headers = descriptor.headers.len(),
            "Response head written"
        );
        Ok(())
    }

    async fn on_chunk(&mut self, chunk: Bytes) -> Result<(), FailureReason> {
        let limit = self.config.idle_timeout();
        let len = chunk.len();

        if !self.head_written {
            // First body write commits an implicit head.
            guarded(
                limit,
                self.sink.set_status_and_headers(DEFAULT_STATUS, &Headers::new()),
                &mut self.signals,
            )
            .await?;
            self.head_written = true;
        }

        guarded(limit, self.sink.write_body(chunk), &mut self.signals).await?;
        self.window.release(len);

        trace!(exchange_id = %self.channels.id(), len = len, "Response chunk written");

        if self.config.flow_control && len > 0 {
            let grant = u32::try_from(len).unwrap_or(u32::MAX);
            self.emit(ExchangeChannel::ResponseCredit, encode_credit(grant));
        }
        Ok(())
    }

    fn on_credit(&self, payload: &[u8]) -> Result<(), FailureReason> {
        let bytes = decode_credit(payload).ok_or_else(|| {
            FailureReason::ProtocolViolation(format!(
                "malformed credit grant of {} bytes",
                payload.len()
            ))
        })?;

        if let Some(credit) = &self.credit {
            credit.grant(bytes);
            trace!(
                exchange_id = %self.channels.id(),
                granted = bytes,
                available = credit.available(),
                "Request credit granted"
            );
        }
        Ok(())
    }

    fn emit(&self, kind: ExchangeChannel, payload: Bytes) {
        let channel = self.channels.name(kind);
        if let Err(e) = self.transport.emit(channel, payload) {
            debug!(channel = %channel, error = %e, "Emit failed");
        }
    }

    async fn teardown(mut self, result: Result<(), FailureReason>) {
        let id = self.channels.id();
        let limit = self.config.idle_timeout();

        // Stop intake first: nothing may reach the sink after this point.
        let removed = self.listeners.release();
        self.inbox.close();
        if let Some(credit) = &self.credit {
            credit.close();
        }

        let outcome = match result {
            Ok(()) => {
                if let Err(reason) = bounded(limit, self.sink.end()).await {
                    warn!(exchange_id = %id, %reason, "Response sink failed to end");
                }
                ExchangeOutcome::Completed
            }
            Err(reason) => {
                if reason.is_locally_originated() {
                    self.emit(
                        ExchangeChannel::RequestAbort,
                        Bytes::from(reason.to_string()),
                    );
                }
                ExchangeOutcome::Failed(reason)
            }
        };

        let to = if outcome.is_completed() {
            ExchangeState::Completed
        } else {
            ExchangeState::Failed
        };
        if let Err(e) = self.state.advance(to) {
            warn!(exchange_id = %id, error = %e, "Unexpected lifecycle transition");
        }
        self.stats.record_finished(&outcome);

        match &outcome {
            ExchangeOutcome::Completed => {
                info!(exchange_id = %id, listeners_removed = removed, "Exchange completed");
            }
            ExchangeOutcome::Failed(reason) => {
                warn!(
                    exchange_id = %id,
                    listeners_removed = removed,
                    reason = %reason,
                    "Exchange failed"
                );
            }
        }

        // Published before the fault response so a stalled sink cannot
        // hold the outcome back.
        let fault = outcome.failure().cloned();
        self.outcome.send_replace(Some(outcome));

        // A faulted sink is dropped without further writes.
        if let Some(reason) = fault {
            if !matches!(reason, FailureReason::LocalSinkFault(_)) {
                if !self.head_written {
                    if let Err(e) = bounded(limit, self.sink.set_status(reason.fault_status())).await {
                        debug!(exchange_id = %id, error = %e, "Fault status not written");
                        return;
                    }
                }
                if let Err(e) = bounded(limit, self.sink.end()).await {
                    debug!(exchange_id = %id, error = %e, "Response sink not ended");
                }
            }
        }
    }
}

/// Resolves once the transport reports itself closed (or drops its signal).
async fn transport_gone(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

/// Sleep until `deadline`, or forever without one.
async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Run one in-loop sink write, bounded by `limit` and cut short by any
/// interrupting signal.
async fn guarded<F>(limit: Duration, write: F, signals: &mut Signals) -> Result<(), FailureReason>
where
    F: Future<Output = Result<(), SinkError>>,
{
    tokio::select! {
        biased;

        reason = signals.interrupted() => Err(reason),
        written = bounded(limit, write) => written,
    }
}

/// Run one sink write, bounded by `limit`.
async fn bounded<F>(limit: Duration, write: F) -> Result<(), FailureReason>
where
    F: Future<Output = Result<(), SinkError>>,
{
    match timeout(limit, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(FailureReason::LocalSinkFault(e.to_string())),
        Err(_) => Err(FailureReason::LocalSinkFault(format!(
            "write stalled for {}ms",
            limit.as_millis()
        ))),
    }
}
