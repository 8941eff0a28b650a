//! API error types and helpers.
//!
//! # Purpose and responsibility
//! Centralizes HTTP error response construction so every registry endpoint
//! returns the same error shape.
//!
//! # Key invariants and assumptions
//! - Error responses carry a stable `code` and a human-readable `message`.
//! - Status codes match the error category: 404 missing user, 409 duplicate
//!   `(sub, issuer)`, 422 invalid input, 401/403 access, 500 internal.
//!
//! # Security considerations
//! - Internal errors log details server-side but return generic messages.
use crate::api::types::ErrorResponse;
use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Structured API error returned by handlers and the access guard.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, code: &str, message: &str) -> ApiError {
    ApiError {
        status,
        body: ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            request_id: None,
        },
    }
}

pub fn api_not_found(message: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn api_conflict(code: &str, message: &str) -> ApiError {
    api_error(StatusCode::CONFLICT, code, message)
}

/// Build a 422 error for path, query or body values that fail validation.
pub fn api_unprocessable(message: &str) -> ApiError {
    api_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", message)
}

/// Build a 500 error from a store error.
///
/// The store error is logged; the response only carries `message`.
pub fn api_internal(message: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = ?err, "registry storage error");
    api_internal_message(message)
}

pub fn api_internal_message(message: &str) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

pub fn api_unauthorized(message: &str) -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

pub fn api_forbidden(message: &str) -> ApiError {
    api_error(StatusCode::FORBIDDEN, "forbidden", message)
}

pub fn api_payload_too_large(message: &str) -> ApiError {
    api_error(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", message)
}

/// Map a store failure to its HTTP form.
pub fn api_store_error(err: StoreError, context: &str) -> ApiError {
    match err {
        StoreError::NotFound(message) => api_not_found(&message),
        StoreError::Conflict(message) => api_conflict("already_exists", &message),
        other => api_internal(context, &other),
    }
}
