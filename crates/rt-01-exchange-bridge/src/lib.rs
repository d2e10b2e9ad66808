//! # rt-01-exchange-bridge
//!
//! Exchange Bridge: carries one HTTP exchange through a reverse tunnel that
//! multiplexes many exchanges over a single shared transport.
//!
//! ## Overview
//!
//! This subsystem provides:
//! - **Two-phase open**: listeners first, then an acknowledged handshake
//!   carrying the encrypted request descriptor
//! - **Body relay**: ordered request chunks out, response events replayed
//!   into the HTTP response sink
//! - **Single teardown**: one owner task per exchange releases listeners and
//!   closes the sink exactly once
//! - **Flow control and deadlines**: credit windows, idle and absolute timeouts
//!
//! ## Architecture
//!
//! ```text
//! HTTP boundary ──RequestDescriptor + ResponseSink──→ ExchangeBridge
//!                                                         │
//!                              exchange-init (ack) ←──────┤
//!                              exchange-chunk-{id} ←──────┤
//!                 exchange-response-*-{id} ──→ owner task ─┴──→ ResponseSink
//! ```
//!
//! ## Failure Statuses
//!
//! | Failure (no headers written yet) | Status |
//! |----------------------------------|--------|
//! | Remote fault, local abort, sink fault | 500 |
//! | Protocol violation, transport closed | 502 |
//! | Timeout | 504 |
//!
//! ## Example
//!
//! ```rust,ignore
//! use rt_01_exchange_bridge::{ChannelResponseSink, TunnelApi, TunnelService};
//!
//! let service = TunnelService::new(crypto, transport, BridgeConfig::from_env())?;
//! let (sink, responses) = ChannelResponseSink::channel(32);
//!
//! let mut bridge = service
//!     .open_request("GET", "/health", headers, Box::new(sink))
//!     .await
//!     .map_err(|failure| failure.error)?;
//! bridge.relay_body(body).await?;
//! let outcome = bridge.finished().await;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod bridge;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use adapters::{ChannelResponseSink, ResponseEvent};
pub use bridge::{AbortHandle, ExchangeBridge, OpenFailure};
pub use domain::{
    BridgeConfig, ConfigError, ExchangeOutcome, ExchangeState, ExchangeStats, FailureReason,
    StatsSnapshot,
};
pub use error::{BridgeError, BridgeResult, HandshakeCause};
pub use ports::{ResponseSink, SinkError, TunnelApi};
pub use service::TunnelService;
