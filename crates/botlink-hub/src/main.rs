//! botlink hub.
//!
//! The platform-agnostic core process: hosts one WebSocket link per backend,
//! routes their events through the module list, and pushes every outbound
//! message through the filtered, throttled send pipeline.

use std::net::SocketAddr;

use tracing_subscriber::{fmt, EnvFilter};

use botlink_hub::{app_state, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cfg = match config::load_from_file("hub.yaml") {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "config load failed");
            return;
        }
    };
    let listen: SocketAddr = match cfg.hub.listen.parse() {
        Ok(listen) => listen,
        Err(e) => {
            tracing::error!(error = %e, "hub.listen must be a valid SocketAddr");
            return;
        }
    };

    let state = app_state::AppState::new(cfg);
    let app = router::build_router(state);

    tracing::info!(%listen, "botlink-hub starting");
    let listener = match tokio::net::TcpListener::bind(listen).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server failed");
    }
}
