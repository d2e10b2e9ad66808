//! Bridge configuration with validation.
//!
//! Values come from defaults, a serialized config section, or `RT_*`
//! environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Per-exchange limits and deadlines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Deadline for the initiation acknowledgment
    pub handshake_timeout_ms: u64,
    /// Maximum silence from the peer once active; also bounds sink writes
    pub idle_timeout_ms: u64,
    /// Optional hard cap on an exchange's lifetime, measured from activation
    pub max_exchange_duration_ms: Option<u64>,
    /// Enable credit windows in both directions
    pub flow_control: bool,
    /// Initial request-body credit
    pub request_window_bytes: u32,
    /// Maximum response bytes buffered before the peer is considered overrunning
    pub response_window_bytes: u32,
    /// Largest request chunk put on the wire
    pub max_chunk_bytes: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 10_000,
            idle_timeout_ms: 30_000,
            max_exchange_duration_ms: None,
            flow_control: true,
            request_window_bytes: 256 * 1024,
            response_window_bytes: 256 * 1024,
            max_chunk_bytes: 64 * 1024,
        }
    }
}

impl BridgeConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handshake_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "handshake_timeout_ms cannot be 0".into(),
            ));
        }

        if self.idle_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "idle_timeout_ms cannot be 0".into(),
            ));
        }

        if self.max_exchange_duration_ms == Some(0) {
            return Err(ConfigError::InvalidTimeout(
                "max_exchange_duration_ms cannot be 0".into(),
            ));
        }

        if self.max_chunk_bytes == 0 {
            return Err(ConfigError::InvalidLimit("max_chunk_bytes cannot be 0".into()));
        }

        if self.flow_control {
            if self.request_window_bytes == 0 || self.response_window_bytes == 0 {
                return Err(ConfigError::InvalidLimit(
                    "credit windows cannot be 0 with flow control enabled".into(),
                ));
            }
            if self.max_chunk_bytes > self.request_window_bytes {
                return Err(ConfigError::InvalidLimit(format!(
                    "max_chunk_bytes ({}) exceeds request_window_bytes ({})",
                    self.max_chunk_bytes, self.request_window_bytes
                )));
            }
        }

        Ok(())
    }

    /// Defaults overridden from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through `lookup`, which maps a variable name to
    /// its value. Unparsable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "RT_HANDSHAKE_TIMEOUT_MS") {
            config.handshake_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "RT_IDLE_TIMEOUT_MS") {
            config.idle_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "RT_MAX_EXCHANGE_DURATION_MS") {
            config.max_exchange_duration_ms = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "RT_FLOW_CONTROL") {
            config.flow_control = v;
        }
        if let Some(v) = parse_var(&lookup, "RT_REQUEST_WINDOW_BYTES") {
            config.request_window_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, "RT_RESPONSE_WINDOW_BYTES") {
            config.response_window_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, "RT_MAX_CHUNK_BYTES") {
            config.max_chunk_bytes = v;
        }

        config
    }

    /// Handshake deadline.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Idle deadline.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Absolute lifetime cap, if any.
    pub fn max_exchange_duration(&self) -> Option<Duration> {
        self.max_exchange_duration_ms.map(Duration::from_millis)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => {
            info!(key = key, "Loaded setting from environment");
            Some(value)
        }
        Err(_) => {
            warn!(key = key, value = %raw, "Ignoring unparsable setting");
            None
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Invalid size or credit limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}
