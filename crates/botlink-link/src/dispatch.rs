//! Packet dispatcher.
//!
//! Handlers are registered per wire tag; exactly one handler fires per
//! packet. The default path feeds query results to the correlator; anything
//! else unmatched is logged and ignored. Handler errors are caught at this
//! boundary — they never end the link loop.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use botlink_core::protocol::Packet;
use botlink_core::Result;

use crate::connection::{Connection, PacketListener};
use crate::correlate::QueryCorrelator;

/// Typed handler for one packet tag.
#[async_trait]
pub trait PacketHandler: Send + Sync {
    async fn handle(&self, conn: &Connection, packet: Packet) -> Result<()>;
}

/// Lifecycle observer for connection open/close.
#[async_trait]
pub trait LinkHook: Send + Sync {
    async fn opened(&self, _conn: &Connection) {}
    async fn closed(&self, _conn: &Connection) {}
}

/// Registry and router for inbound packets on one link.
pub struct Dispatcher {
    handlers: DashMap<&'static str, Arc<dyn PacketHandler>>,
    hooks: Vec<Arc<dyn LinkHook>>,
    correlator: Arc<QueryCorrelator>,
}

impl Dispatcher {
    pub fn new(correlator: Arc<QueryCorrelator>) -> Self {
        Self {
            handlers: DashMap::new(),
            hooks: Vec::new(),
            correlator,
        }
    }

    /// Register the handler for a tag; the last registration wins.
    pub fn register(&self, tag: &'static str, handler: Arc<dyn PacketHandler>) {
        self.handlers.insert(tag, handler);
    }

    /// Attach a lifecycle hook. Hooks run in attachment order.
    pub fn add_hook(&mut self, hook: Arc<dyn LinkHook>) {
        self.hooks.push(hook);
    }

    pub fn correlator(&self) -> Arc<QueryCorrelator> {
        Arc::clone(&self.correlator)
    }

    pub fn registered_tags(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|e| *e.key()).collect()
    }
}

#[async_trait]
impl PacketListener for Dispatcher {
    async fn connection_opened(&self, conn: &Connection) {
        for hook in &self.hooks {
            hook.opened(conn).await;
        }
    }

    async fn receive_packet(&self, conn: &Connection, packet: Packet) {
        let tag = packet.tag();
        let handler = self.handlers.get(tag).map(|e| Arc::clone(e.value()));
        match handler {
            Some(handler) => {
                if let Err(e) = handler.handle(conn, packet).await {
                    tracing::warn!(conn = conn.id(), tag, error = %e, "packet handler failed");
                }
            }
            None => match packet {
                Packet::QueryResult(result) => {
                    let id = result.query_id;
                    if !self.correlator.complete(result) {
                        tracing::debug!(conn = conn.id(), query_id = id, "stale query result");
                    }
                }
                other => {
                    tracing::debug!(conn = conn.id(), tag = other.tag(), "no handler, dropping");
                }
            },
        }
    }

    async fn connection_closed(&self, conn: &Connection) {
        self.correlator.fail_all();
        for hook in &self.hooks {
            hook.closed(conn).await;
        }
    }
}
