//! Axum router wiring (HTTP -> WS upgrade).
//!
//! Exposes `/v1/link` for backend links and `/healthz` for liveness.

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};

use crate::{app_state::AppState, transport};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/link", get(transport::ws::link_upgrade))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
