//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OrderError;
use engine::EngineError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Engine error.
    Engine(EngineError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Engine(err) => engine_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn engine_error_to_response(err: EngineError) -> (StatusCode, String) {
    match &err {
        EngineError::Order(order_err) => match order_err {
            OrderError::InvalidTransition { .. } | OrderError::AssignmentLocked { .. } => {
                (StatusCode::CONFLICT, err.to_string())
            }
            OrderError::PreconditionUnmet(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            _ => (StatusCode::BAD_REQUEST, err.to_string()),
        },
        EngineError::CredentialRejected => (StatusCode::UNAUTHORIZED, err.to_string()),
        EngineError::ConfirmationAlreadyRecorded { .. }
        | EngineError::DuplicateOrderNumber(_) => (StatusCode::CONFLICT, err.to_string()),
        EngineError::OrderNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        EngineError::ResendThrottled { .. } => (StatusCode::TOO_MANY_REQUESTS, err.to_string()),
        EngineError::Persistence(_) => {
            tracing::error!(error = %err, "persistence failure");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}
