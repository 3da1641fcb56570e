//! Query-string translation of relay requests
//!
//! `GET /api?id=<device>&type=<vib|whois>&data=<json>` runs the same
//! request handler as the socket `GET` event.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::state::HubState;
use crate::websocket::messages::parse_json_or_string;

/// Query parameters of `/api`
#[derive(Debug, Default, Deserialize)]
pub struct ApiQuery {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// JSON text; anything unparseable is passed on as a string
    pub data: Option<String>,
}

/// Create the api router
pub fn api_router(state: HubState) -> Router {
    Router::new()
        .route("/api", get(handle_api))
        .with_state(state)
}

async fn handle_api(
    State(state): State<HubState>,
    Query(query): Query<ApiQuery>,
) -> ApiResult<Json<ApiResponse>> {
    let id = required(query.id, "id")?;
    let kind = required(query.kind, "type")?;
    let data = query.data.map(parse_json_or_string).unwrap_or(Value::Null);

    let message = state.router.lock().await.handle_request(&id, &kind, data)?;
    tracing::debug!(device = %id, kind = %kind, "Api request handled");

    Ok(Json(ApiResponse::ok(message)))
}

fn required(value: Option<String>, field: &'static str) -> ApiResult<String> {
    value
        .filter(|s| !s.is_empty())
        .ok_or(ApiError::MissingField(field))
}
