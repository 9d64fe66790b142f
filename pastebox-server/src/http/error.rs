//! API error types with IntoResponse
//!
//! Errors are converted to JSON responses with appropriate status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::models::ValidationError;
use crate::store::StoreError;

/// API error type with automatic HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Validation failed (400)
    Validation(ValidationError),

    /// Resource not found (404)
    NotFound { resource: &'static str, id: String },

    /// Key already held by a live document (409)
    Conflict { key: String },

    /// Store or connection failure (500, or 503 when transient; logged)
    Store(StoreError),

    /// Request body refused before reaching a handler (400, 413, 415, 422)
    Rejected { status: StatusCode, message: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Validation(e) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "validation_error",
                    "message": e.to_string()
                }),
            ),
            Self::NotFound { resource, id } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "not_found",
                    "message": format!("{} '{}' not found", resource, id)
                }),
            ),
            Self::Conflict { key } => (
                StatusCode::CONFLICT,
                json!({
                    "error": "conflict",
                    "message": format!("key '{}' is already in use", key)
                }),
            ),
            Self::Rejected { status, message } => {
                let error = if *status == StatusCode::PAYLOAD_TOO_LARGE {
                    "payload_too_large"
                } else if *status == StatusCode::UNSUPPORTED_MEDIA_TYPE {
                    "unsupported_media_type"
                } else {
                    "validation_error"
                };
                (
                    *status,
                    json!({
                        "error": error,
                        "message": message
                    }),
                )
            }
            Self::Store(e) if e.is_transient() => {
                tracing::error!(error = %e, "Transient store error");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({
                        "error": "unavailable",
                        "message": "storage temporarily unavailable, retry later"
                    }),
                )
            }
            Self::Store(e) => {
                // Log the actual error, return generic message
                tracing::error!(error = %e, "Store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "internal_error",
                        "message": "an internal error occurred"
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Invalid(v) => Self::Validation(v),
            StoreError::DuplicateKey { key } => Self::Conflict { key },
            other => Self::Store(other),
        }
    }
}
