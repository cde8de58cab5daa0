//! Hub link client (WebSocket).
//!
//! `Connector` is the dial seam: production dials the hub with
//! tokio-tungstenite, tests hand back in-process channel transports.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use botlink_core::{BotlinkError, Result};
use botlink_link::{Frame, FrameSink, FrameStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials one connection to the hub.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)>;
}

/// Production connector: WebSocket to the hub's `/v1/link`.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
        let (socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| BotlinkError::Transport(e.to_string()))?;
        let (tx, rx) = socket.split();
        Ok((
            Box::new(TungsteniteSink(tx)),
            Box::new(TungsteniteStream(rx)),
        ))
    }
}

struct TungsteniteSink(SplitSink<WsStream, WsMessage>);

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Text(text) => WsMessage::Text(text),
            Frame::Ping(payload) => WsMessage::Ping(payload),
            Frame::Pong(payload) => WsMessage::Pong(payload),
            Frame::Close => WsMessage::Close(None),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| BotlinkError::Transport(e.to_string()))
    }
}

struct TungsteniteStream(SplitStream<WsStream>);

#[async_trait]
impl FrameStream for TungsteniteStream {
    async fn next(&mut self) -> Option<Result<Frame>> {
        loop {
            return match self.0.next().await? {
                Ok(WsMessage::Text(text)) => Some(Ok(Frame::Text(text))),
                Ok(WsMessage::Ping(payload)) => Some(Ok(Frame::Ping(payload))),
                Ok(WsMessage::Pong(payload)) => Some(Ok(Frame::Pong(payload))),
                Ok(WsMessage::Close(_)) => Some(Ok(Frame::Close)),
                // Binary and raw frames are not part of the protocol.
                Ok(_) => continue,
                Err(e) => Some(Err(BotlinkError::Transport(e.to_string()))),
            };
        }
    }
}
