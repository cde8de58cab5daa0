//! botlink backend.
//!
//! One process per chat network: logs into the platform, links to the hub,
//! and keeps that link alive until stopped.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

use botlink_backend::client::WsConnector;
use botlink_backend::config;
use botlink_backend::session::DemoSession;
use botlink_backend::supervisor::Supervisor;

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cfg = match config::load_from_file("backend.yaml") {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "config load failed");
            return;
        }
    };

    // Platform SDK bindings ship as separate session implementations; this
    // binary carries the loopback demo network.
    let (session, events) = match cfg.account.network.as_str() {
        "demo" => DemoSession::new(&cfg.account.id),
        other => {
            tracing::error!(network = other, "no session implementation for this network");
            return;
        }
    };

    tracing::info!(
        network = %cfg.account.network,
        hub = %cfg.hub.url,
        "botlink-backend starting"
    );

    let supervisor = Supervisor::new(
        Arc::new(WsConnector::new(cfg.hub.url.clone())),
        session,
        events,
        Duration::from_millis(cfg.hub.reconnect_backoff_ms),
        cfg.hub.max_retries,
    );
    supervisor.run().await;
}
