//! Listener handlers that feed an exchange's inbox.
//!
//! Handlers run on the transport dispatcher, so they only classify the event
//! and enqueue it. Everything else happens on the owner task.

use crate::domain::ResponseWindow;
use bytes::Bytes;
use shared_bus::{ChannelSet, EventHandler, ExchangeChannel};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Inbound event for one exchange, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InboxEvent {
    /// Encrypted response descriptor
    Headers(Bytes),
    /// Response body bytes
    Chunk(Bytes),
    /// Response finished
    End,
    /// Peer reported failure
    Error(Bytes),
    /// Request-body credit grant
    Credit(Bytes),
    /// Peer sent more response bytes than the window allows
    Overflow { buffered: usize },
}

pub(crate) type Inbox = mpsc::UnboundedReceiver<InboxEvent>;

/// Build the `(channel, handler)` pairs for every listener of the exchange.
///
/// The returned handlers hold the only senders of the inbox, so the inbox
/// closes once they are all unsubscribed.
pub(crate) fn listeners(
    channels: &ChannelSet,
    window: &Arc<ResponseWindow>,
    flow_control: bool,
) -> (Vec<(String, EventHandler)>, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();

    let handlers = ChannelSet::local_listeners(flow_control)
        .into_iter()
        .map(|kind| {
            let name = channels.name(kind).to_string();
            let handler = handler_for(kind, name.clone(), tx.clone(), window.clone());
            (name, handler)
        })
        .collect();

    (handlers, rx)
}

fn handler_for(
    kind: ExchangeChannel,
    name: String,
    tx: mpsc::UnboundedSender<InboxEvent>,
    window: Arc<ResponseWindow>,
) -> EventHandler {
    Arc::new(move |payload: Bytes| {
        let event = match kind {
            ExchangeChannel::ResponseHeaders => InboxEvent::Headers(payload),
            ExchangeChannel::ResponseChunk => match window.receive(payload.len()) {
                Ok(_) => InboxEvent::Chunk(payload),
                Err(buffered) => InboxEvent::Overflow { buffered },
            },
            ExchangeChannel::ResponseEnd => InboxEvent::End,
            ExchangeChannel::ResponseError => InboxEvent::Error(payload),
            ExchangeChannel::RequestCredit => InboxEvent::Credit(payload),
            // Emitted by this side; never subscribed.
            ExchangeChannel::RequestChunk
            | ExchangeChannel::RequestEnd
            | ExchangeChannel::RequestAbort
            | ExchangeChannel::ResponseCredit => return,
        };

        if tx.send(event).is_err() {
            trace!(channel = %name, "Event after teardown ignored");
        }
    })
}
