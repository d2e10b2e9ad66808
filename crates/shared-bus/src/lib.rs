//! # Shared Bus - Transport for Tunnelled Exchanges
//!
//! Every exchange is multiplexed over one shared duplex connection. This
//! crate defines that connection's port and the per-exchange channel
//! vocabulary built on top of it.
//!
//! ## Multiplexing
//!
//! ```text
//! ┌──────────────┐                         ┌──────────────┐
//! │ Exchange A   │  exchange-chunk-{A}     │              │
//! │              │ ──────┐                 │              │
//! └──────────────┘       ▼                 │  Remote peer │
//!                  ┌──────────────┐        │              │
//!                  │  Transport   │ ──────→│              │
//!                  └──────────────┘        │              │
//! ┌──────────────┐       ▲                 │              │
//! │ Exchange B   │ ──────┘                 │              │
//! └──────────────┘  exchange-chunk-{B}     └──────────────┘
//! ```
//!
//! ## Rules
//!
//! - A channel name has at most one handler at a time
//! - Listener sets register all their channels or none of them
//! - Handlers run on the dispatcher and never block

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod listeners;
pub mod memory;
pub mod transport;

// Re-export main types
pub use events::{
    decode_credit, encode_credit, parse_channel, ChannelSet, Direction, ExchangeChannel,
    INIT_CHANNEL,
};
pub use listeners::ListenerSet;
pub use memory::{AckResponder, CallHandler, InMemoryTransport, TransportStats};
pub use transport::{EventHandler, TransportChannel, TransportError};
