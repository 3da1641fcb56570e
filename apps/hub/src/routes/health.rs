//! Health check HTTP route handlers
//!
//! - `GET /health` - Simple liveness check (returns 200 OK)
//! - `GET /health/live` - Liveness probe with version
//! - `GET /health/stats` - Connection and room counts

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};

use crate::state::HubState;

/// Create health check router
pub fn health_router(state: HubState) -> Router {
    Router::new()
        .route("/", get(simple_health))
        .route("/live", get(liveness_probe))
        .route("/stats", get(stats))
        .with_state(state)
}

async fn simple_health() -> &'static str {
    "OK"
}

async fn liveness_probe() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Registry sizes plus open sockets
///
/// The two connection counts can differ briefly while a socket closes.
async fn stats(State(state): State<HubState>) -> impl IntoResponse {
    let registry = state.router.lock().await.stats();
    Json(serde_json::json!({
        "sockets": state.connections.total_connections(),
        "registry": registry,
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}
