//! Ports module for the exchange bridge

pub mod inbound;
pub mod outbound;

pub use inbound::TunnelApi;
pub use outbound::{ResponseSink, SinkError};
