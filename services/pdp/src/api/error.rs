//! API error types and helpers.
//!
//! # Key invariants
//! - Error bodies use the OPA shape: a stable `code` plus a human-readable
//!   `message`.
use crate::api::types::ErrorResponse;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

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

/// Build a 400 error for a request body that is not a valid query document.
pub fn api_invalid_parameter(message: &str) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        body: ErrorResponse {
            code: "invalid_parameter".to_string(),
            message: message.to_string(),
            request_id: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameter_is_bad_request() {
        let err = api_invalid_parameter("bad body");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body.code, "invalid_parameter");
        assert_eq!(err.body.message, "bad body");
    }

    #[test]
    fn request_id_is_omitted_when_absent() {
        let body = serde_json::to_value(api_invalid_parameter("x").body).expect("json");
        assert!(body.get("request_id").is_none());
    }
}
