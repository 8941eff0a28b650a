//! Request guard for the user routes.
//!
//! # Purpose
//! Authenticates the bearer token, asks the configured authorizer about the
//! request, and hands the caller identity to the handlers as an extension.
//!
//! # Key invariants
//! - A missing bearer or a failed authentication is `403`.
//! - A denial is `401`; decision point failures are `500`.
//! - Bodies over `MAX_BODY_BYTES` are `413`.
//! - The body is buffered once to compute `has_body` and then restored for
//!   the handler.
use crate::api::error::{
    ApiError, api_forbidden, api_internal_message, api_payload_too_large, api_unauthorized,
};
use crate::api::users::USERS_PATH;
use crate::app::AppState;
use crate::auth::authz::AuthzError;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use datacloud_policy::PolicyInput;

/// Upper bound for buffered request bodies.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub async fn require_access(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(authenticator) = state.access.authenticator.as_ref() else {
        return Ok(next.run(request).await);
    };
    let token = extract_bearer(request.headers())
        .ok_or_else(|| api_forbidden("Not authenticated"))?
        .to_string();
    let caller = authenticator.authenticate(&token).await.map_err(|err| {
        tracing::info!(error = %err, "bearer token rejected");
        metrics::counter!("datacloud_registry_authn_failures_total").increment(1);
        api_forbidden(&format!("Authentication failed: {err}"))
    })?;

    if declared_length(request.headers()).is_some_and(|length| length > MAX_BODY_BYTES) {
        return Err(body_too_large());
    }
    let (mut parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|err| {
            tracing::info!(error = %err, "request body not buffered within limit");
            body_too_large()
        })?;

    if let Some(authorizer) = state.access.authorizer.as_ref() {
        let input = PolicyInput::new(
            Some(caller.user_info()),
            policy_path(parts.uri.path()),
            parts.method.as_str(),
            !body.is_empty(),
        );
        authorizer.authorize(&input).await.map_err(|err| {
            tracing::info!(
                mode = authorizer.mode(),
                method = %parts.method,
                path = parts.uri.path(),
                error = %err,
                "request not authorized"
            );
            authz_error(&err)
        })?;
    }

    parts.extensions.insert(caller);
    Ok(next.run(Request::from_parts(parts, Body::from(body))).await)
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn body_too_large() -> ApiError {
    api_payload_too_large(&format!(
        "Request body exceeds {MAX_BODY_BYTES} bytes"
    ))
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// The collection is authorized under its trailing-slash form.
fn policy_path(path: &str) -> String {
    if path == USERS_PATH {
        format!("{path}/")
    } else {
        path.to_string()
    }
}

fn authz_error(err: &AuthzError) -> ApiError {
    match err {
        AuthzError::Denied => api_unauthorized(&err.to_string()),
        _ => api_internal_message(&err.to_string()),
    }
}
