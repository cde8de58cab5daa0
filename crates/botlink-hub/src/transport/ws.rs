//! WebSocket handler for backend links.
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS at `/v1/link`
//! - Adapt the axum socket halves to the link loop's frame traits
//! - Wire a per-connection dispatcher: handshake creates the environment,
//!   events go to the manager, results feed the correlator
//! - Heartbeat ping + idle timeout from config

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use botlink_core::protocol::Packet;
use botlink_core::{BotlinkError, Result};
use botlink_link::{
    run_link, Connection, Dispatcher, Frame, FrameSink, FrameStream, LinkConfig, LinkHook,
    PacketHandler, QueryCorrelator,
};

use crate::app_state::AppState;
use crate::environment::DelegateEnvironment;

pub async fn link_upgrade(State(app): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        run_session(app, socket).await;
    })
}

async fn run_session(app: AppState, socket: WebSocket) {
    let hub = &app.cfg().hub;
    let config = LinkConfig {
        outbound_queue: 256,
        ping_interval: Some(Duration::from_millis(hub.ping_interval_ms)),
        idle_timeout: Some(Duration::from_millis(hub.idle_timeout_ms)),
    };
    let correlator = Arc::new(QueryCorrelator::with_timeout(Duration::from_millis(
        hub.query_timeout_ms,
    )));
    let dispatcher = session_dispatcher(&app, correlator);

    let (ws_tx, ws_rx) = socket.split();
    if let Err(e) = run_link(
        AxumSink(ws_tx),
        AxumStream(ws_rx),
        app.registry(),
        Arc::new(dispatcher),
        config,
    )
    .await
    {
        tracing::info!(error = %e, "backend link ended with error");
    }
}

/// Wire the per-connection dispatcher: handshake creates the environment,
/// events go to the manager, teardown drops the environment.
pub fn session_dispatcher(app: &AppState, correlator: Arc<QueryCorrelator>) -> Dispatcher {
    let mut dispatcher = Dispatcher::new(Arc::clone(&correlator));
    dispatcher.register(
        botlink_core::protocol::packet::tags::HANDSHAKE,
        Arc::new(HandshakeHandler {
            app: app.clone(),
            correlator,
        }),
    );
    let events = Arc::new(EventHandler { app: app.clone() });
    for tag in [
        botlink_core::protocol::packet::tags::GROUP_MESSAGE,
        botlink_core::protocol::packet::tags::FRIEND_MESSAGE,
        botlink_core::protocol::packet::tags::STRANGER_MESSAGE,
        botlink_core::protocol::packet::tags::GROUP_RECALL,
        botlink_core::protocol::packet::tags::FRIEND_RECALL,
        botlink_core::protocol::packet::tags::MEMBER_ADD,
    ] {
        dispatcher.register(tag, Arc::clone(&events) as Arc<dyn PacketHandler>);
    }
    dispatcher.add_hook(Arc::new(CleanupHook { app: app.clone() }));
    dispatcher
}

// --------------------
// Frame adapters
// --------------------

struct AxumSink(SplitSink<WebSocket, WsMessage>);

#[async_trait]
impl FrameSink for AxumSink {
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

struct AxumStream(SplitStream<WebSocket>);

#[async_trait]
impl FrameStream for AxumStream {
    async fn next(&mut self) -> Option<Result<Frame>> {
        loop {
            return match self.0.next().await? {
                Ok(WsMessage::Text(text)) => Some(Ok(Frame::Text(text))),
                Ok(WsMessage::Ping(payload)) => Some(Ok(Frame::Ping(payload))),
                Ok(WsMessage::Pong(payload)) => Some(Ok(Frame::Pong(payload))),
                Ok(WsMessage::Close(_)) => Some(Ok(Frame::Close)),
                // Binary frames are not part of the protocol; skip them.
                Ok(WsMessage::Binary(_)) => continue,
                Err(e) => Some(Err(BotlinkError::Transport(e.to_string()))),
            };
        }
    }
}

// --------------------
// Per-connection handlers
// --------------------

struct HandshakeHandler {
    app: AppState,
    correlator: Arc<QueryCorrelator>,
}

#[async_trait]
impl PacketHandler for HandshakeHandler {
    async fn handle(&self, conn: &Connection, packet: Packet) -> Result<()> {
        let Packet::Handshake(profile) = packet else {
            return Ok(());
        };
        conn.establish(profile.clone());
        let env = DelegateEnvironment::new(
            profile,
            conn.clone(),
            Arc::clone(&self.correlator),
            self.app.filter(),
            self.app.journal(),
            self.app.illustrator(),
            self.app.cfg().mirrors.clone(),
        );
        tracing::info!(
            conn = conn.id(),
            network = env.network(),
            bot = env.profile().bot_id,
            "backend connected"
        );
        self.app.environments().insert(conn.id(), Arc::new(env));
        Ok(())
    }
}

struct EventHandler {
    app: AppState,
}

#[async_trait]
impl PacketHandler for EventHandler {
    async fn handle(&self, conn: &Connection, packet: Packet) -> Result<()> {
        let Packet::Event(event) = packet else {
            return Ok(());
        };
        let Some(env) = self.app.environments().get(conn.id()) else {
            return Err(BotlinkError::Protocol("event before handshake".into()));
        };
        // Modules may query the backend; hand off so the read loop stays free.
        let manager = self.app.manager();
        tokio::spawn(async move {
            manager.dispatch_event(env, event).await;
        });
        Ok(())
    }
}

struct CleanupHook {
    app: AppState,
}

#[async_trait]
impl LinkHook for CleanupHook {
    async fn closed(&self, conn: &Connection) {
        if let Some(env) = self.app.environments().remove(conn.id()) {
            tracing::info!(
                conn = conn.id(),
                network = env.network(),
                "backend disconnected, environment dropped"
            );
        }
    }
}
