//! The submission API's error response shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Field-level detail attached to a validation error.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Errors the submit endpoint can return.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// Malformed request body or a field that failed validation.
    Validation(Vec<FieldError>),
    /// A store, queue, or event-bus operation failed.
    Backend(String),
}

impl ApiError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError { field: field.into(), message: message.into() }])
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    fields: Vec<FieldError>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(fields) => {
                let body = ErrorBody { error: "Validation Error".to_string(), fields };
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            Self::Backend(message) => {
                tracing::error!(error = %message, "submission backend failure");
                let body = ErrorBody { error: "Internal".to_string(), fields: Vec::new() };
                (StatusCode::BAD_GATEWAY, Json(body)).into_response()
            }
        }
    }
}

impl From<meridian_execution::ports::StoreError> for ApiError {
    fn from(err: meridian_execution::ports::StoreError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<meridian_queue::QueueError> for ApiError {
    fn from(err: meridian_queue::QueueError) -> Self {
        Self::Backend(err.to_string())
    }
}
