//! PDP HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router over the OPA Data API and defines the shared state
//! injected into handlers.
use crate::api;
use axum::Router;
use axum::routing::get;
use datacloud_policy::PolicyEngine;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub engine: PolicyEngine,
    /// Name of the policy package served under `/v1/data/`.
    pub package: String,
}

impl AppState {
    pub fn new(engine: PolicyEngine) -> Self {
        Self {
            engine,
            package: datacloud_policy::PACKAGE.to_string(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health::health))
        .route(
            "/v1/data/:package",
            get(api::data::get_package).post(api::data::post_package),
        )
        .route(
            "/v1/data/:package/*rule",
            get(api::data::get_rule).post(api::data::post_rule),
        )
        .layer(
            TraceLayer::new_for_http().make_span_with(datacloud_observability::http_request_span),
        )
        .with_state(state)
}
