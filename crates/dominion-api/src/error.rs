//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Errors rendered as `{"error": "..."}` with a matching status code.
#[derive(Debug)]
pub enum ApiError {
    Internal(dominion_core::Error),
    NotFound(String),
    BadRequest(String),
    Forbidden(String),
}

impl From<dominion_core::Error> for ApiError {
    fn from(err: dominion_core::Error) -> Self {
        match err {
            dominion_core::Error::NotFound(msg) => ApiError::NotFound(msg),
            dominion_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            dominion_core::Error::Decode(e) => ApiError::BadRequest(e.to_string()),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Internal(err) => {
                tracing::error!(
                    subsystem = "api",
                    error = %err,
                    "Request failed"
                );
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
