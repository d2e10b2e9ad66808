//! [`ResponseSink`] that hands response events to an HTTP server task over a
//! bounded channel.
//!
//! The bound is the sink's backpressure: a full channel makes writes wait,
//! and a dropped receiver makes them fail with `SinkError::Closed`.

use crate::ports::outbound::{ResponseSink, SinkError};
use async_trait::async_trait;
use bytes::Bytes;
use shared_types::Headers;
use tokio::sync::mpsc;

/// One write observed by the HTTP side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    /// Status line and headers
    Head { status: u16, headers: Headers },
    /// Status only, no headers
    Status(u16),
    /// Body bytes
    Body(Bytes),
    /// Response finished
    End,
}

/// Channel-backed response sink.
#[derive(Debug)]
pub struct ChannelResponseSink {
    tx: mpsc::Sender<ResponseEvent>,
    head_written: bool,
    ended: bool,
}

impl ChannelResponseSink {
    /// Create a sink and the receiver the server task drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ResponseEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                head_written: false,
                ended: false,
            },
            rx,
        )
    }

    async fn send(&mut self, event: ResponseEvent) -> Result<(), SinkError> {
        if self.ended {
            return Err(SinkError::AlreadyEnded);
        }
        self.tx.send(event).await.map_err(|_| SinkError::Closed)
    }

    async fn send_head(&mut self, event: ResponseEvent) -> Result<(), SinkError> {
        if self.head_written {
            return Err(SinkError::HeadAlreadyWritten);
        }
        self.send(event).await?;
        self.head_written = true;
        Ok(())
    }
}

#[async_trait]
impl ResponseSink for ChannelResponseSink {
    async fn set_status_and_headers(
        &mut self,
        status: u16,
        headers: &Headers,
    ) -> Result<(), SinkError> {
        self.send_head(ResponseEvent::Head {
            status,
            headers: headers.clone(),
        })
        .await
    }

    async fn set_status(&mut self, status: u16) -> Result<(), SinkError> {
        self.send_head(ResponseEvent::Status(status)).await
    }

    async fn write_body(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        self.send(ResponseEvent::Body(chunk)).await
    }

    async fn end(&mut self) -> Result<(), SinkError> {
        self.send(ResponseEvent::End).await?;
        self.ended = true;
        Ok(())
    }
}
