//! Domain layer: lifecycle, credit, outcomes and configuration of an
//! exchange.

pub mod config;
pub mod flow;
pub mod outcome;
pub mod state;
pub mod stats;

pub use config::{BridgeConfig, ConfigError};
pub use flow::{RequestCredit, ResponseWindow};
pub use outcome::{
    ExchangeOutcome, FailureReason, STATUS_BAD_GATEWAY, STATUS_GATEWAY_TIMEOUT,
    STATUS_SERVER_FAULT,
};
pub use state::{ExchangeState, StateCell};
pub use stats::{ExchangeStats, StatsSnapshot};
