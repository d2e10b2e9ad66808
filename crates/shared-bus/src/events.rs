//! # Exchange Channels
//!
//! Names of every event that flows through the transport for one exchange.
//! Channel names are derived from the exchange id once, in [`ChannelSet`],
//! and parsed back with [`parse_channel`]; nothing else builds them.
//!
//! ```text
//! local ──exchange-init (ack)──────────────────────→ remote
//! local ──exchange-chunk-{id} / -end- / -abort-────→ remote
//! local ──exchange-response-credit-{id}────────────→ remote
//! local ←─exchange-response-headers-{id}───────────  remote
//! local ←─exchange-response-chunk-{id}─────────────  remote
//! local ←─exchange-response-end-{id} / -error-─────  remote
//! local ←─exchange-credit-{id}─────────────────────  remote
//! ```

use bytes::Bytes;
use shared_types::ExchangeId;

/// Shared, acknowledged initiation channel.
pub const INIT_CHANNEL: &str = "exchange-init";

/// Which side emits on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Emitted by the local proxy.
    LocalToRemote,
    /// Emitted by the remote peer.
    RemoteToLocal,
}

/// One per-exchange channel kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeChannel {
    /// Raw request body bytes.
    RequestChunk,
    /// Request body finished.
    RequestEnd,
    /// Local side gave up on the exchange.
    RequestAbort,
    /// Local side grants response-body credit.
    ResponseCredit,
    /// Encrypted response descriptor.
    ResponseHeaders,
    /// Raw response body bytes.
    ResponseChunk,
    /// Response finished (terminal).
    ResponseEnd,
    /// Remote failure (terminal).
    ResponseError,
    /// Remote side grants request-body credit.
    RequestCredit,
}

impl ExchangeChannel {
    /// Every channel kind, in a fixed order used for indexing.
    pub const ALL: [ExchangeChannel; 9] = [
        ExchangeChannel::RequestChunk,
        ExchangeChannel::RequestEnd,
        ExchangeChannel::RequestAbort,
        ExchangeChannel::ResponseCredit,
        ExchangeChannel::ResponseHeaders,
        ExchangeChannel::ResponseChunk,
        ExchangeChannel::ResponseEnd,
        ExchangeChannel::ResponseError,
        ExchangeChannel::RequestCredit,
    ];

    /// Channel name prefix; the exchange id follows it.
    pub fn prefix(self) -> &'static str {
        match self {
            ExchangeChannel::RequestChunk => "exchange-chunk-",
            ExchangeChannel::RequestEnd => "exchange-end-",
            ExchangeChannel::RequestAbort => "exchange-abort-",
            ExchangeChannel::ResponseCredit => "exchange-response-credit-",
            ExchangeChannel::ResponseHeaders => "exchange-response-headers-",
            ExchangeChannel::ResponseChunk => "exchange-response-chunk-",
            ExchangeChannel::ResponseEnd => "exchange-response-end-",
            ExchangeChannel::ResponseError => "exchange-response-error-",
            ExchangeChannel::RequestCredit => "exchange-credit-",
        }
    }

    /// Emitting side.
    pub fn direction(self) -> Direction {
        match self {
            ExchangeChannel::RequestChunk
            | ExchangeChannel::RequestEnd
            | ExchangeChannel::RequestAbort
            | ExchangeChannel::ResponseCredit => Direction::LocalToRemote,
            ExchangeChannel::ResponseHeaders
            | ExchangeChannel::ResponseChunk
            | ExchangeChannel::ResponseEnd
            | ExchangeChannel::ResponseError
            | ExchangeChannel::RequestCredit => Direction::RemoteToLocal,
        }
    }

    /// Whether the first occurrence ends the exchange.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExchangeChannel::ResponseEnd | ExchangeChannel::ResponseError
        )
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Every channel name of one exchange, computed once from its id.
#[derive(Debug, Clone)]
pub struct ChannelSet {
    id: ExchangeId,
    names: [String; 9],
}

impl ChannelSet {
    /// Derive all channel names for `id`.
    pub fn new(id: ExchangeId) -> Self {
        let names = std::array::from_fn(|i| format!("{}{}", ExchangeChannel::ALL[i].prefix(), id));
        Self { id, names }
    }

    /// Exchange this set belongs to.
    pub fn id(&self) -> ExchangeId {
        self.id
    }

    /// Name of `channel` for this exchange.
    pub fn name(&self, channel: ExchangeChannel) -> &str {
        &self.names[channel.index()]
    }

    /// Channels the local side listens on. The request-credit channel is
    /// only included when flow control is enabled.
    pub fn local_listeners(flow_control: bool) -> Vec<ExchangeChannel> {
        ExchangeChannel::ALL
            .into_iter()
            .filter(|c| c.direction() == Direction::RemoteToLocal)
            .filter(|c| flow_control || *c != ExchangeChannel::RequestCredit)
            .collect()
    }

    /// Channels the remote side listens on.
    pub fn remote_listeners() -> Vec<ExchangeChannel> {
        ExchangeChannel::ALL
            .into_iter()
            .filter(|c| c.direction() == Direction::LocalToRemote)
            .collect()
    }
}

/// Split a channel name back into its kind and exchange id.
///
/// Returns `None` for the init channel, unknown prefixes and bad ids.
pub fn parse_channel(name: &str) -> Option<(ExchangeChannel, ExchangeId)> {
    ExchangeChannel::ALL.into_iter().find_map(|channel| {
        name.strip_prefix(channel.prefix())
            .and_then(|rest| ExchangeId::parse(rest).ok())
            .map(|id| (channel, id))
    })
}

/// Encode a credit grant (4-byte big-endian byte count).
pub fn encode_credit(bytes: u32) -> Bytes {
    Bytes::copy_from_slice(&bytes.to_be_bytes())
}

/// Decode a credit grant; `None` unless the payload is exactly 4 bytes.
pub fn decode_credit(payload: &[u8]) -> Option<u32> {
    let raw: [u8; 4] = payload.try_into().ok()?;
    Some(u32::from_be_bytes(raw))
}
