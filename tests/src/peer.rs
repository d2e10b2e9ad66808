//! # Scripted Peer
//!
//! Plays the remote side of the tunnel on one end of an in-memory transport.
//! Initiation calls are answered according to the current [`AckPolicy`]; for
//! every accepted exchange the peer subscribes to the request-side channels
//! before acknowledging, so no request event can be missed.

use bytes::Bytes;
use parking_lot::Mutex;
use shared_bus::{
    decode_credit, encode_credit, AckResponder, ChannelSet, EventHandler, ExchangeChannel,
    InMemoryTransport, TransportChannel, INIT_CHANNEL,
};
use shared_crypto::{decrypt_object, encrypt_object, CryptoAdapter};
use shared_types::{ExchangeId, Headers, RequestDescriptor, ResponseDescriptor};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// How long helpers wait for the bridge before giving up.
pub const PEER_WAIT: Duration = Duration::from_secs(3);

/// How the peer answers the next initiation calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckPolicy {
    Accept,
    Reject(String),
    /// Never answer
    Silent,
}

/// Request-side event observed by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Chunk(Bytes),
    End,
    Abort(String),
    ResponseCredit(u32),
    /// Credit payload that did not decode
    MalformedCredit(Bytes),
}

type ExchangeMap = HashMap<ExchangeId, mpsc::UnboundedReceiver<PeerEvent>>;

/// Remote endpoint driven by a test.
pub struct ScriptedPeer {
    transport: InMemoryTransport,
    crypto: Arc<dyn CryptoAdapter>,
    policy: Arc<Mutex<AckPolicy>>,
    exchanges: Arc<Mutex<ExchangeMap>>,
    requests: mpsc::UnboundedReceiver<RequestDescriptor>,
}

impl ScriptedPeer {
    /// Start serving `exchange-init` on `transport`.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if the init channel already has a handler.
    pub fn spawn(transport: InMemoryTransport, crypto: Arc<dyn CryptoAdapter>) -> Self {
        let (calls_tx, mut calls) = mpsc::unbounded_channel::<(Bytes, AckResponder)>();
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let policy = Arc::new(Mutex::new(AckPolicy::Accept));
        let exchanges: Arc<Mutex<ExchangeMap>> = Arc::new(Mutex::new(HashMap::new()));

        // The handler only forwards; the task below owns the transport clone.
        transport
            .on_call(
                INIT_CHANNEL,
                Arc::new(move |payload: Bytes, ack: AckResponder| {
                    let _ = calls_tx.send((payload, ack));
                }),
            )
            .unwrap_or_else(|e| panic!("init channel unavailable: {e}"));

        let task_transport = transport.clone();
        let task_crypto = crypto.clone();
        let task_policy = policy.clone();
        let task_exchanges = exchanges.clone();
        tokio::spawn(async move {
            while let Some((payload, ack)) = calls.recv().await {
                let request: RequestDescriptor =
                    match decrypt_object(task_crypto.as_ref(), &payload) {
                        Ok(request) => request,
                        Err(e) => {
                            warn!(error = %e, "Peer could not open request descriptor");
                            ack.reject(format!("undecryptable request: {e}"));
                            continue;
                        }
                    };

                let policy = task_policy.lock().clone();
                match policy {
                    AckPolicy::Accept => {
                        let events = watch_exchange(&task_transport, request.id);
                        task_exchanges.lock().insert(request.id, events);
                        let _ = requests_tx.send(request);
                        ack.accept(Bytes::new());
                    }
                    AckPolicy::Reject(reason) => {
                        let _ = requests_tx.send(request);
                        ack.reject(reason);
                    }
                    AckPolicy::Silent => {
                        let _ = requests_tx.send(request);
                        drop(ack);
                    }
                }
            }
        });

        Self {
            transport,
            crypto,
            policy,
            exchanges,
            requests,
        }
    }

    /// Change how later initiation calls are answered.
    pub fn set_policy(&self, policy: AckPolicy) {
        *self.policy.lock() = policy;
    }

    /// Remote transport endpoint.
    pub fn transport(&self) -> &InMemoryTransport {
        &self.transport
    }

    /// Next request descriptor the peer received, whatever the policy.
    pub async fn next_request(&mut self) -> Option<RequestDescriptor> {
        timeout(PEER_WAIT, self.requests.recv()).await.ok().flatten()
    }

    /// Script handle for an accepted exchange.
    pub fn exchange(&self, id: ExchangeId) -> Option<PeerExchange> {
        let events = self.exchanges.lock().remove(&id)?;
        Some(PeerExchange {
            channels: ChannelSet::new(id),
            transport: self.transport.clone(),
            crypto: self.crypto.clone(),
            events,
        })
    }

    /// Wait for the next accepted exchange.
    ///
    /// # Panics
    ///
    /// Panics if no request arrives in time.
    pub async fn accept_next(&mut self) -> PeerExchange {
        let request = self
            .next_request()
            .await
            .unwrap_or_else(|| panic!("no exchange-init received"));
        self.exchange(request.id)
            .unwrap_or_else(|| panic!("exchange {} was not accepted", request.id))
    }
}

/// Subscribe every request-side channel of `id`, replacing stale listeners
/// left by an earlier exchange with the same id.
fn watch_exchange(
    transport: &InMemoryTransport,
    id: ExchangeId,
) -> mpsc::UnboundedReceiver<PeerEvent> {
    let channels = ChannelSet::new(id);
    let (tx, rx) = mpsc::unbounded_channel();

    for kind in ChannelSet::remote_listeners() {
        let name = channels.name(kind);
        if transport.unsubscribe(name) {
            debug!(channel = %name, "Peer replaced stale listener");
        }
        let tx = tx.clone();
        let handler: EventHandler = Arc::new(move |payload: Bytes| {
            let event = match kind {
                ExchangeChannel::RequestChunk => PeerEvent::Chunk(payload),
                ExchangeChannel::RequestEnd => PeerEvent::End,
                ExchangeChannel::RequestAbort => {
                    PeerEvent::Abort(String::from_utf8_lossy(&payload).into_owned())
                }
                ExchangeChannel::ResponseCredit => match decode_credit(&payload) {
                    Some(bytes) => PeerEvent::ResponseCredit(bytes),
                    None => PeerEvent::MalformedCredit(payload),
                },
                _ => return,
            };
            let _ = tx.send(event);
        });
        if let Err(e) = transport.subscribe(name, handler) {
            warn!(channel = %name, error = %e, "Peer could not subscribe");
        }
    }
    rx
}

/// Remote half of one accepted exchange.
pub struct PeerExchange {
    channels: ChannelSet,
    transport: InMemoryTransport,
    crypto: Arc<dyn CryptoAdapter>,
    events: mpsc::UnboundedReceiver<PeerEvent>,
}

impl PeerExchange {
    pub fn id(&self) -> ExchangeId {
        self.channels.id()
    }

    fn emit(&self, kind: ExchangeChannel, payload: Bytes) {
        let name = self.channels.name(kind);
        if let Err(e) = self.transport.emit(name, payload) {
            debug!(channel = %name, error = %e, "Peer emit failed");
        }
    }

    /// Send encrypted response headers.
    ///
    /// # Panics
    ///
    /// Panics if the descriptor cannot be sealed.
    pub fn headers(&self, status: u16, headers: Headers) {
        let descriptor = ResponseDescriptor::new(status, headers);
        let blob = encrypt_object(self.crypto.as_ref(), &descriptor)
            .unwrap_or_else(|e| panic!("seal response descriptor: {e}"));
        self.emit(ExchangeChannel::ResponseHeaders, Bytes::from(blob));
    }

    /// Send a headers event whose payload is not a valid blob.
    pub fn garbage_headers(&self) {
        self.emit(
            ExchangeChannel::ResponseHeaders,
            Bytes::from_static(b"not a sealed descriptor"),
        );
    }

    pub fn chunk(&self, bytes: impl Into<Bytes>) {
        self.emit(ExchangeChannel::ResponseChunk, bytes.into());
    }

    pub fn end(&self) {
        self.emit(ExchangeChannel::ResponseEnd, Bytes::new());
    }

    pub fn error(&self, info: &str) {
        self.emit(
            ExchangeChannel::ResponseError,
            Bytes::copy_from_slice(info.as_bytes()),
        );
    }

    /// Grant request-body credit.
    pub fn grant(&self, bytes: u32) {
        self.emit(ExchangeChannel::RequestCredit, encode_credit(bytes));
    }

    /// Next request-side event, skipping response-credit grants.
    pub async fn next_event(&mut self) -> Option<PeerEvent> {
        loop {
            match self.next_raw().await? {
                PeerEvent::ResponseCredit(_) => continue,
                other => return Some(other),
            }
        }
    }

    /// Next request-side event, credit grants included.
    pub async fn next_raw(&mut self) -> Option<PeerEvent> {
        timeout(PEER_WAIT, self.events.recv()).await.ok().flatten()
    }

    /// Whether an event is already queued, without waiting.
    pub fn try_next(&mut self) -> Option<PeerEvent> {
        self.events.try_recv().ok()
    }

    /// Collect request chunks until the body ends or the exchange aborts.
    ///
    /// Returns the chunks and the terminal event, if one arrived in time.
    pub async fn read_body(&mut self) -> (Vec<Bytes>, Option<PeerEvent>) {
        let mut chunks = Vec::new();
        while let Some(event) = self.next_event().await {
            match event {
                PeerEvent::Chunk(chunk) => chunks.push(chunk),
                terminal => return (chunks, Some(terminal)),
            }
        }
        (chunks, None)
    }
}
