//! Frame transport abstraction.
//!
//! The protocol assumes a persistent, ordered stream with message boundaries
//! supplied by the transport (WebSocket in production). Both halves are
//! traits so the hub (axum socket), a backend (tungstenite socket), and
//! in-process tests (channel pair) plug into the same link loop.

use async_trait::async_trait;
use tokio::sync::mpsc;

use botlink_core::{BotlinkError, Result};

/// One transport frame. Text carries an envelope; Ping/Pong keep the link
/// alive; Close ends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// Write half of a frame transport.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Frame) -> Result<()>;
}

/// Read half of a frame transport. `None` means the peer is gone.
#[async_trait]
pub trait FrameStream: Send {
    async fn next(&mut self) -> Option<Result<Frame>>;
}

#[async_trait]
impl FrameSink for Box<dyn FrameSink> {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        (**self).send(frame).await
    }
}

#[async_trait]
impl FrameStream for Box<dyn FrameStream> {
    async fn next(&mut self) -> Option<Result<Frame>> {
        (**self).next().await
    }
}

/// In-process write half backed by an mpsc channel.
pub struct ChannelSink {
    tx: mpsc::Sender<Frame>,
}

/// In-process read half backed by an mpsc channel.
pub struct ChannelStream {
    rx: mpsc::Receiver<Frame>,
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| BotlinkError::ConnectionClosed)
    }
}

#[async_trait]
impl FrameStream for ChannelStream {
    async fn next(&mut self) -> Option<Result<Frame>> {
        self.rx.recv().await.map(Ok)
    }
}

/// Two linked in-process transports, one per peer. Frames written on one
/// side's sink arrive in order on the other side's stream.
pub fn channel_pair(capacity: usize) -> ((ChannelSink, ChannelStream), (ChannelSink, ChannelStream)) {
    let (a_tx, b_rx) = mpsc::channel(capacity);
    let (b_tx, a_rx) = mpsc::channel(capacity);
    (
        (ChannelSink { tx: a_tx }, ChannelStream { rx: a_rx }),
        (ChannelSink { tx: b_tx }, ChannelStream { rx: b_rx }),
    )
}
