//! Adapters for the bridge's outbound ports.

pub mod channel_sink;

pub use channel_sink::{ChannelResponseSink, ResponseEvent};
