//! The admin surface: `/healthz` and `/status`, simple debug routes
//! reporting fleet state. Not a product surface — the config loader and
//! console commands that would normally front this are out of scope (§1).

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

pub async fn healthz() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct StatusResponse {
    uptime_ms: i64,
    registered_servers: usize,
    active_parties: usize,
}

pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registered_servers = state.registry.len().await;
    let active_parties = state.party.active_party_count().await.unwrap_or(0);
    let uptime_ms = state.clock.now_millis() - state.started_at_millis;

    Json(StatusResponse {
        uptime_ms,
        registered_servers,
        active_parties,
    })
}
