//! HTTP error handling
//!
//! Maps relay validation failures onto the `{success, message, code}` body
//! returned by the `/api` translation layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::relay::ValidationError;

/// Body of every `/api` response
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: Value,
    /// Error code for client-side handling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl ApiResponse {
    pub fn ok(message: Value) -> Self {
        Self {
            success: true,
            message,
            code: None,
        }
    }
}

/// Errors surfaced by HTTP handlers
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request rejected by the relay
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Required query parameter absent
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Result type alias for HTTP handlers
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::MissingField(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.code(),
            Self::MissingField(_) => "MISSING_FIELD",
        }
    }

    /// Client errors are expected traffic; keep them at debug
    pub fn log(&self) {
        tracing::debug!(
            error = %self,
            code = self.error_code(),
            status = self.status_code().as_u16(),
            "Client error"
        );
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();

        let body = ApiResponse {
            success: false,
            message: Value::String(self.to_string()),
            code: Some(self.error_code()),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
