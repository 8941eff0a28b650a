//! OPA Data API handlers.
//!
//! # Purpose
//! Answers `GET|POST /v1/data/{package}` and `GET|POST /v1/data/{package}/{rule}`
//! by evaluating the policy rules against the optional `input` document.
//!
//! # Key invariants
//! - Unknown packages and rules are undefined documents (`200 {}`), never errors.
//! - A missing `input` evaluates every rule to `false`.
//! - Only a body that is not a JSON object is rejected (`400 invalid_parameter`).
use crate::api::error::{ApiError, api_invalid_parameter};
use crate::api::types::{DataRequest, DataResponse};
use crate::app::AppState;
use axum::Json;
use axum::extract::{Path, State};
use bytes::Bytes;
use datacloud_policy::{PolicyInput, Rule};
use std::time::Instant;

pub(crate) async fn post_package(
    State(state): State<AppState>,
    Path(package): Path<String>,
    body: Bytes,
) -> Result<Json<DataResponse>, ApiError> {
    let input = parse_input(&body)?;
    Ok(Json(package_document(&state, &package, input)))
}

pub(crate) async fn get_package(
    State(state): State<AppState>,
    Path(package): Path<String>,
) -> Json<DataResponse> {
    Json(package_document(&state, &package, None))
}

pub(crate) async fn post_rule(
    State(state): State<AppState>,
    Path((package, rule)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<DataResponse>, ApiError> {
    let input = parse_input(&body)?;
    Ok(Json(rule_document(&state, &package, &rule, input)))
}

pub(crate) async fn get_rule(
    State(state): State<AppState>,
    Path((package, rule)): Path<(String, String)>,
) -> Json<DataResponse> {
    Json(rule_document(&state, &package, &rule, None))
}

fn parse_input(body: &Bytes) -> Result<Option<PolicyInput>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let request: DataRequest = serde_json::from_slice(body).map_err(|err| {
        api_invalid_parameter(&format!("body contains malformed input document: {err}"))
    })?;
    Ok(request.input)
}

fn package_document(
    state: &AppState,
    package: &str,
    input: Option<PolicyInput>,
) -> DataResponse {
    if package != state.package {
        tracing::debug!(package, "undefined package");
        return DataResponse::default();
    }
    let input = input.unwrap_or_default();
    let started = Instant::now();
    let decision = state.engine.evaluate(&input);
    record_decision("*", decision.allow, started);
    tracing::info!(
        path = input.path.as_deref().unwrap_or_default(),
        method = input.method.as_deref().unwrap_or_default(),
        allow = decision.allow,
        is_admin = decision.is_admin,
        is_user = decision.is_user,
        "package decision"
    );
    DataResponse {
        result: serde_json::to_value(decision).ok(),
    }
}

fn rule_document(
    state: &AppState,
    package: &str,
    rule: &str,
    input: Option<PolicyInput>,
) -> DataResponse {
    let rule_name = rule.trim_matches('/');
    let Ok(rule) = rule_name.parse::<Rule>() else {
        tracing::debug!(package, rule = rule_name, "undefined rule");
        return DataResponse::default();
    };
    if package != state.package {
        tracing::debug!(package, "undefined package");
        return DataResponse::default();
    }
    let input = input.unwrap_or_default();
    let started = Instant::now();
    let result = state.engine.evaluate_rule(rule, &input);
    record_decision(rule.as_str(), result, started);
    tracing::info!(
        rule = rule.as_str(),
        path = input.path.as_deref().unwrap_or_default(),
        method = input.method.as_deref().unwrap_or_default(),
        result,
        "rule decision"
    );
    DataResponse {
        result: Some(result.into()),
    }
}

fn record_decision(rule: &'static str, result: bool, started: Instant) {
    let outcome = if result { "true" } else { "false" };
    metrics::counter!("datacloud_pdp_decisions_total", "rule" => rule, "result" => outcome)
        .increment(1);
    metrics::histogram!("datacloud_pdp_decision_seconds", "rule" => rule)
        .record(started.elapsed().as_secs_f64());
}
