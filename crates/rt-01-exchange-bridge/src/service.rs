//! Tunnel Service - opens exchanges over one shared transport.
//!
//! Holds the collaborators every exchange shares (crypto adapter, transport,
//! configuration, statistics) so the HTTP boundary only supplies the request
//! and the sink.

use crate::bridge::{ExchangeBridge, OpenFailure};
use crate::domain::{BridgeConfig, ConfigError, ExchangeStats, StatsSnapshot};
use crate::ports::inbound::TunnelApi;
use crate::ports::outbound::ResponseSink;
use async_trait::async_trait;
use shared_bus::TransportChannel;
use shared_crypto::CryptoAdapter;
use shared_types::RequestDescriptor;
use std::sync::Arc;
use tracing::info;

/// Exchange factory bound to one transport.
pub struct TunnelService {
    crypto: Arc<dyn CryptoAdapter>,
    transport: Arc<dyn TransportChannel>,
    config: BridgeConfig,
    stats: Arc<ExchangeStats>,
}

impl TunnelService {
    /// Create a service; `config` is validated once here.
    pub fn new(
        crypto: Arc<dyn CryptoAdapter>,
        transport: Arc<dyn TransportChannel>,
        config: BridgeConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            flow_control = config.flow_control,
            idle_timeout_ms = config.idle_timeout_ms,
            "Tunnel service ready"
        );
        Ok(Self {
            crypto,
            transport,
            config,
            stats: Arc::new(ExchangeStats::default()),
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Live counters shared with every opened bridge.
    pub fn exchange_stats(&self) -> &Arc<ExchangeStats> {
        &self.stats
    }
}

#[async_trait]
impl TunnelApi for TunnelService {
    async fn open_exchange(
        &self,
        request: RequestDescriptor,
        sink: Box<dyn ResponseSink>,
    ) -> Result<ExchangeBridge, OpenFailure> {
        ExchangeBridge::open_with(
            self.crypto.clone(),
            request,
            self.transport.clone(),
            sink,
            self.config.clone(),
            self.stats.clone(),
        )
        .await
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
