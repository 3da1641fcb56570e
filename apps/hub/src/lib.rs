//! VibHub relay hub
//!
//! Apps (controllers) and devices (hardware endpoints) connect over a
//! WebSocket, find each other by a shared device id and exchange control
//! and telemetry messages through the hub.
//!
//! The library is split so the relay can be driven without sockets:
//! - [`relay`] holds the protocol state and handlers
//! - [`websocket`] adapts sockets to the relay
//! - [`routes`] serves the HTTP surface

pub mod config;
pub mod error;
pub mod relay;
pub mod routes;
pub mod state;
pub mod websocket;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use config::{ConfigError, ConfigResult, HubConfig};
pub use error::{ApiError, ApiResponse, ApiResult};
pub use state::HubState;

use routes::{api_router, health_router};

/// Build the HTTP application
pub fn app(state: HubState) -> Router {
    Router::new()
        .route("/ws", get(websocket::ws_handler))
        .with_state(state.clone())
        .merge(api_router(state.clone()))
        .nest("/health", health_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
