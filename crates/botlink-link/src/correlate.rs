//! Query correlation.
//!
//! Queries are fire-and-forget packets with a process-unique id; the
//! correlator parks a waiter per id and completes it when the matching
//! result arrives. Invariant: every waiter leaves the table exactly once —
//! matched, timed out, or failed at teardown — so reconnect cycles never
//! leak pending entries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;

use botlink_core::protocol::{Packet, Query, QueryResult};
use botlink_core::{BotlinkError, Result};

use crate::connection::Connection;

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Pending-query table for one connection.
pub struct QueryCorrelator {
    next_id: AtomicU64,
    pending: DashMap<u64, oneshot::Sender<Result<Vec<u8>>>>,
    timeout: Duration,
}

impl QueryCorrelator {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_QUERY_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            timeout,
        }
    }

    /// Ids are never reused while a query with that id is pending.
    fn mint_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a query and await its result payload. `make` receives the fresh
    /// correlation id and builds the concrete query.
    pub async fn ask<F>(&self, conn: &Connection, make: F) -> Result<Vec<u8>>
    where
        F: FnOnce(u64) -> Query,
    {
        let id = self.mint_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        if let Err(e) = conn.send_packet(&Packet::Query(make(id))).await {
            self.pending.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Waiter dropped without an answer: teardown beat the result.
            Ok(Err(_)) => Err(BotlinkError::ConnectionClosed),
            Err(_) => {
                self.pending.remove(&id);
                Err(BotlinkError::QueryTimeout)
            }
        }
    }

    /// Route a result to its waiter. Returns false for unmatched ids (stale
    /// results after a timeout), which callers log and drop.
    pub fn complete(&self, result: QueryResult) -> bool {
        match self.pending.remove(&result.query_id) {
            Some((_, tx)) => {
                let _ = tx.send(Ok(result.payload));
                true
            }
            None => false,
        }
    }

    /// Fail every pending waiter immediately. Called at connection teardown
    /// so no caller is left waiting out its timeout.
    pub fn fail_all(&self) {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(BotlinkError::ConnectionClosed));
            }
        }
    }

    /// Number of in-flight queries.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for QueryCorrelator {
    fn default() -> Self {
        Self::new()
    }
}
