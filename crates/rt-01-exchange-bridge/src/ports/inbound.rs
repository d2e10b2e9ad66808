//! Driving Ports (API - Inbound)

use crate::bridge::{ExchangeBridge, OpenFailure};
use crate::domain::StatsSnapshot;
use crate::ports::outbound::ResponseSink;
use async_trait::async_trait;
use shared_types::{Headers, RequestDescriptor};

/// Entry point used by the HTTP boundary.
///
/// One call per inbound request; the returned bridge carries the request
/// body and replays the remote response into `sink`.
#[async_trait]
pub trait TunnelApi: Send + Sync {
    /// Open an exchange for `request`, keeping its identifier.
    ///
    /// # Errors
    ///
    /// Returns an [`OpenFailure`] holding the error and the untouched sink.
    async fn open_exchange(
        &self,
        request: RequestDescriptor,
        sink: Box<dyn ResponseSink>,
    ) -> Result<ExchangeBridge, OpenFailure>;

    /// Open an exchange under a fresh identifier.
    async fn open_request(
        &self,
        method: &str,
        url: &str,
        headers: Headers,
        sink: Box<dyn ResponseSink>,
    ) -> Result<ExchangeBridge, OpenFailure> {
        self.open_exchange(RequestDescriptor::new(method, url, headers), sink)
            .await
    }

    /// Exchange counters.
    fn stats(&self) -> StatsSnapshot;
}
