//! Reconnect supervisor.
//!
//! Drives the connect -> run -> disconnect -> backoff cycle against the hub.
//! The retry counter resets only after a session that actually got its
//! handshake onto the wire; crossing the ceiling shuts the backend down and
//! logs out the platform session, bounding reconnect storms against a
//! permanently unreachable hub.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};

use botlink_core::protocol::{Event, Packet, PacketRegistry};
use botlink_link::{run_link, Connection, Dispatcher, LinkConfig, LinkHook, QueryCorrelator};

use crate::client::Connector;
use crate::responder::{HandshakeHook, Responder};
use crate::session::NetworkSession;

pub struct Supervisor {
    connector: Arc<dyn Connector>,
    session: Arc<dyn NetworkSession>,
    events: Arc<Mutex<mpsc::Receiver<Event>>>,
    registry: Arc<PacketRegistry>,
    backoff: Duration,
    max_retries: u32,
    stopped: Arc<AtomicBool>,
}

impl Supervisor {
    pub fn new(
        connector: Arc<dyn Connector>,
        session: Arc<dyn NetworkSession>,
        events: mpsc::Receiver<Event>,
        backoff: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            connector,
            session,
            events: Arc::new(Mutex::new(events)),
            registry: Arc::new(PacketRegistry::standard()),
            backoff,
            max_retries,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    fn stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Run until the stop action arrives, the platform session goes offline,
    /// or the retry ceiling is crossed. Always logs the session out at the
    /// end.
    pub async fn run(&self) {
        let mut retry: u32 = 0;

        while !self.stopped() && self.session.is_online() {
            if retry >= self.max_retries {
                tracing::error!(
                    retries = retry,
                    "retry ceiling reached, can't link to hub, shutting down"
                );
                break;
            }

            tracing::info!("connecting to hub");
            match self.connector.connect().await {
                Ok((sink, stream)) => {
                    // Reset only when the session really reached the hub:
                    // the handshake is the proof it did.
                    if self.run_session(sink, stream).await {
                        retry = 0;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to link");
                }
            }

            if self.stopped() || !self.session.is_online() {
                break;
            }

            retry += 1;
            tracing::info!(
                backoff_secs = self.backoff.as_secs(),
                "disconnected, waiting to reconnect"
            );
            tokio::time::sleep(self.backoff).await;
        }

        tracing::info!("supervisor shut down");
        self.session.close().await;
    }

    /// One connected session: wire the dispatcher, pump native events up the
    /// link, and block until the connection closes. Returns whether the
    /// handshake made it out.
    async fn run_session(
        &self,
        sink: Box<dyn botlink_link::FrameSink>,
        stream: Box<dyn botlink_link::FrameStream>,
    ) -> bool {
        let responder = Arc::new(Responder::new(
            Arc::clone(&self.session),
            Arc::clone(&self.stopped),
        ));
        let handshake = HandshakeHook::new(Arc::clone(&self.session));
        let handshook = handshake.sent_flag();

        let (conn_tx, conn_rx) = watch::channel::<Option<Connection>>(None);

        let mut dispatcher = Dispatcher::new(Arc::new(QueryCorrelator::new()));
        responder.register_on(&dispatcher);
        dispatcher.add_hook(Arc::new(handshake));
        dispatcher.add_hook(Arc::new(ConnCapture { slot: conn_tx }));

        let pump = tokio::spawn(pump_events(Arc::clone(&self.events), conn_rx));

        let result = run_link(
            sink,
            stream,
            Arc::clone(&self.registry),
            Arc::new(dispatcher),
            LinkConfig::default(),
        )
        .await;

        pump.abort();
        if let Err(e) = result {
            tracing::warn!(error = %e, "session ended with error");
        }
        handshook.load(Ordering::Acquire)
    }
}

/// Forward native platform events up the link for as long as it lives.
async fn pump_events(
    events: Arc<Mutex<mpsc::Receiver<Event>>>,
    mut conn_rx: watch::Receiver<Option<Connection>>,
) {
    loop {
        if conn_rx.borrow().is_some() {
            break;
        }
        if conn_rx.changed().await.is_err() {
            return;
        }
    }
    let Some(conn) = conn_rx.borrow().clone() else {
        return;
    };

    let mut events = events.lock().await;
    while let Some(event) = events.recv().await {
        if conn.send_packet(&Packet::Event(event)).await.is_err() {
            return;
        }
    }
}

struct ConnCapture {
    slot: watch::Sender<Option<Connection>>,
}

#[async_trait::async_trait]
impl LinkHook for ConnCapture {
    async fn opened(&self, conn: &Connection) {
        let _ = self.slot.send(Some(conn.clone()));
    }
}
