//! Connection lifecycle and the link loop.
//!
//! One loop per connection: a single reader decodes and dispatches inbound
//! frames in arrival order, and drains the bounded outbound queue, so two
//! concurrent senders can never interleave on the wire. `connection_opened`
//! fires exactly once before any inbound dispatch; `connection_closed` fires
//! exactly once on teardown, whatever ended the session.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use botlink_core::protocol::{EnvironmentProfile, LinkContext, Packet, PacketRegistry};
use botlink_core::{BotlinkError, Result};

use crate::transport::{Frame, FrameSink, FrameStream};

static LINK_SEQ: AtomicU64 = AtomicU64::new(1);

/// Link loop tuning. Heartbeat is optional; the hub enables it, backends
/// answer pings and rely on the hub's idle timeout.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub outbound_queue: usize,
    pub ping_interval: Option<Duration>,
    pub idle_timeout: Option<Duration>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            outbound_queue: 256,
            ping_interval: None,
            idle_timeout: None,
        }
    }
}

/// Handle to one live connection. Cheap to clone; valid until the link loop
/// ends, after which sends fail with `ConnectionClosed`.
#[derive(Clone)]
pub struct Connection {
    id: u64,
    out_tx: mpsc::Sender<Frame>,
    ctx: Arc<RwLock<LinkContext>>,
    closed: Arc<AtomicBool>,
}

impl Connection {
    fn new(out_tx: mpsc::Sender<Frame>) -> Self {
        Self {
            id: LINK_SEQ.fetch_add(1, Ordering::Relaxed),
            out_tx,
            ctx: Arc::new(RwLock::new(LinkContext::default())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Process-unique id of this connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Snapshot of the reconstruction context (profile + variant table).
    pub fn context(&self) -> LinkContext {
        self.ctx.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// Install the environment once the handshake has been seen or sent.
    pub fn establish(&self, profile: EnvironmentProfile) {
        if let Ok(mut ctx) = self.ctx.write() {
            *ctx = LinkContext::established(profile);
        }
    }

    /// The peer's environment profile, if the handshake happened.
    pub fn profile(&self) -> Option<Arc<EnvironmentProfile>> {
        self.context().profile
    }

    /// Queue a packet for transmission. Fire-and-forget: ordering against
    /// other sends on this connection is guaranteed, delivery is not.
    pub async fn send_packet(&self, packet: &Packet) -> Result<()> {
        let table = self.context().variants;
        let text = packet.encode(table.as_deref())?;
        self.out_tx
            .send(Frame::Text(text))
            .await
            .map_err(|_| BotlinkError::ConnectionClosed)
    }

    /// Request an orderly shutdown of the link loop.
    pub async fn close(&self) {
        let _ = self.out_tx.send(Frame::Close).await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Callbacks a link owner plugs into the loop.
#[async_trait]
pub trait PacketListener: Send + Sync {
    /// Fired once per connection, before any inbound packet is dispatched.
    async fn connection_opened(&self, _conn: &Connection) {}

    /// One reconstructed packet, in wire order.
    async fn receive_packet(&self, conn: &Connection, packet: Packet);

    /// Fired once when the link is torn down (peer close, I/O error, or
    /// explicit close). Connection-scoped state must be released here.
    async fn connection_closed(&self, _conn: &Connection) {}
}

/// Drive one connection until the peer hangs up, an I/O error surfaces, or
/// `Connection::close` is called.
pub async fn run_link<S, R>(
    mut sink: S,
    mut stream: R,
    registry: Arc<PacketRegistry>,
    listener: Arc<dyn PacketListener>,
    config: LinkConfig,
) -> Result<()>
where
    S: FrameSink,
    R: FrameStream,
{
    let (out_tx, mut out_rx) = mpsc::channel(config.outbound_queue.max(1));
    let conn = Connection::new(out_tx);

    listener.connection_opened(&conn).await;

    let mut ping_tick = tokio::time::interval(
        config.ping_interval.unwrap_or(Duration::from_secs(3600)),
    );
    ping_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ping_tick.reset();
    let ping_enabled = config.ping_interval.is_some();

    let mut last_activity = Instant::now();
    let mut result = Ok(());

    'link: loop {
        tokio::select! {
            maybe_out = out_rx.recv() => {
                match maybe_out {
                    Some(Frame::Close) | None => break 'link,
                    Some(frame) => {
                        if let Err(e) = sink.send(frame).await {
                            tracing::warn!(conn = conn.id(), error = %e, "outbound write failed");
                            result = Err(e);
                            break 'link;
                        }
                    }
                }
            }

            incoming = stream.next() => {
                let Some(incoming) = incoming else { break 'link };
                let frame = match incoming {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(conn = conn.id(), error = %e, "read failed");
                        result = Err(e);
                        break 'link;
                    }
                };
                last_activity = Instant::now();

                match frame {
                    Frame::Text(text) => {
                        if let Some(packet) = reconstruct(&registry, &conn, &text) {
                            listener.receive_packet(&conn, packet).await;
                        }
                    }
                    Frame::Ping(payload) => {
                        if sink.send(Frame::Pong(payload)).await.is_err() {
                            break 'link;
                        }
                    }
                    Frame::Pong(_) => {}
                    Frame::Close => break 'link,
                }
            }

            _ = ping_tick.tick(), if ping_enabled => {
                if sink.send(Frame::Ping(Vec::new())).await.is_err() {
                    break 'link;
                }
                if let Some(idle) = config.idle_timeout {
                    if last_activity.elapsed() >= idle {
                        tracing::info!(conn = conn.id(), "idle timeout, closing link");
                        break 'link;
                    }
                }
            }
        }
    }

    let _ = sink.send(Frame::Close).await;
    conn.closed.store(true, Ordering::Release);
    out_rx.close();
    listener.connection_closed(&conn).await;
    result
}

/// Decode one text frame. Failures are logged and the frame is dropped; a
/// bad packet never ends the connection.
fn reconstruct(registry: &PacketRegistry, conn: &Connection, text: &str) -> Option<Packet> {
    let envelope = match botlink_core::protocol::Envelope::decode(text) {
        Ok(env) => env,
        Err(e) => {
            tracing::warn!(conn = conn.id(), error = %e, "dropping undecodable frame");
            return None;
        }
    };
    match registry.reconstruct(&envelope.tag, &conn.context(), envelope.payload()) {
        Ok(packet) => Some(packet),
        Err(e) => {
            tracing::warn!(
                conn = conn.id(),
                tag = %envelope.tag,
                error = %e,
                "dropping unreconstructable packet"
            );
            None
        }
    }
}
