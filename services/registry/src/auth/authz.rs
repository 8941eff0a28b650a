//! Authorization backends.
//!
//! # Purpose
//! Decide whether an authenticated request may proceed, either by asking a
//! remote OPA-compatible decision point or by evaluating the policy rules
//! in-process.
//!
//! # Key invariants
//! - A decision document without `result.allow` is a denial.
//! - Decision point failures surface as server errors, never as denials.
use async_trait::async_trait;
use datacloud_policy::{PolicyEngine, PolicyInput};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    #[error("Unauthorized to perform this operation")]
    Denied,
    #[error("Authentication failed: Bad request sent to OPA server")]
    BadRequest,
    #[error("Authentication failed: OPA server internal error")]
    ServerError,
    #[error("Authentication failed: OPA unexpected response code '{0}'")]
    UnexpectedStatus(u16),
    #[error("Authentication failed: OPA server returned a malformed decision")]
    MalformedDecision,
    #[error("Authentication failed: OPA server is not reachable")]
    Unreachable,
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, input: &PolicyInput) -> Result<(), AuthzError>;

    fn mode(&self) -> &'static str;
}

#[derive(Debug, Default, Deserialize)]
struct DecisionDocument {
    #[serde(default)]
    result: Option<DecisionResult>,
}

#[derive(Debug, Default, Deserialize)]
struct DecisionResult {
    #[serde(default)]
    allow: bool,
}

/// Queries `POST <url>` with `{"input": ...}` and reads `result.allow`.
#[derive(Debug, Clone)]
pub struct OpaAuthorizer {
    client: reqwest::Client,
    url: url::Url,
    timeout: Duration,
}

impl OpaAuthorizer {
    pub fn new(url: url::Url, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            timeout,
        }
    }
}

#[async_trait]
impl Authorizer for OpaAuthorizer {
    async fn authorize(&self, input: &PolicyInput) -> Result<(), AuthzError> {
        let response = self
            .client
            .post(self.url.clone())
            .timeout(self.timeout)
            .json(&json!({ "input": input }))
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, url = %self.url, "decision point request failed");
                AuthzError::Unreachable
            })?;
        match response.status().as_u16() {
            200 => {
                let document: DecisionDocument = response.json().await.map_err(|err| {
                    tracing::warn!(error = %err, "decision point response is not valid JSON");
                    AuthzError::MalformedDecision
                })?;
                let allow = document.result.is_some_and(|result| result.allow);
                metrics::counter!(
                    "datacloud_registry_authz_decisions_total",
                    "mode" => "opa",
                    "allow" => if allow { "true" } else { "false" }
                )
                .increment(1);
                if allow {
                    Ok(())
                } else {
                    Err(AuthzError::Denied)
                }
            }
            400 => Err(AuthzError::BadRequest),
            500 => Err(AuthzError::ServerError),
            other => Err(AuthzError::UnexpectedStatus(other)),
        }
    }

    fn mode(&self) -> &'static str {
        "opa"
    }
}

/// Evaluates the `allow` rule against local trust data.
#[derive(Debug, Clone)]
pub struct EmbeddedAuthorizer {
    engine: PolicyEngine,
}

impl EmbeddedAuthorizer {
    pub fn new(engine: PolicyEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Authorizer for EmbeddedAuthorizer {
    async fn authorize(&self, input: &PolicyInput) -> Result<(), AuthzError> {
        let allow = self.engine.evaluate(input).allow;
        metrics::counter!(
            "datacloud_registry_authz_decisions_total",
            "mode" => "embedded",
            "allow" => if allow { "true" } else { "false" }
        )
        .increment(1);
        if allow { Ok(()) } else { Err(AuthzError::Denied) }
    }

    fn mode(&self) -> &'static str {
        "embedded"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datacloud_policy::{Endpoint, TrustData, UserInfo};

    fn engine() -> PolicyEngine {
        PolicyEngine::new(TrustData {
            trusted_issuers: vec!["https://iam.example.org/".to_string()],
            admin_entitlement: Some("admins".to_string()),
            endpoints: vec![Endpoint::new("/api/v1/users/", "GET")],
        })
    }

    fn input(groups: &[&str], method: &str) -> PolicyInput {
        PolicyInput::new(
            Some(UserInfo::new(
                "https://iam.example.org/",
                groups.iter().map(|group| group.to_string()).collect(),
            )),
            "/api/v1/users/",
            method,
            false,
        )
    }

    #[tokio::test]
    async fn embedded_allows_permitted_endpoint() {
        let authz = EmbeddedAuthorizer::new(engine());
        authz.authorize(&input(&[], "GET")).await.expect("allowed");
        assert_eq!(
            authz.authorize(&input(&[], "DELETE")).await,
            Err(AuthzError::Denied)
        );
        authz
            .authorize(&input(&["admins"], "DELETE"))
            .await
            .expect("admin");
    }

    #[test]
    fn error_messages_match_contract() {
        assert_eq!(
            AuthzError::UnexpectedStatus(404).to_string(),
            "Authentication failed: OPA unexpected response code '404'"
        );
        assert_eq!(
            AuthzError::Denied.to_string(),
            "Unauthorized to perform this operation"
        );
    }

    #[test]
    fn missing_result_is_denial() {
        let document: DecisionDocument = serde_json::from_str("{}").expect("doc");
        assert!(!document.result.is_some_and(|result| result.allow));
        let document: DecisionDocument =
            serde_json::from_str(r#"{"result": {"is_user": true}}"#).expect("doc");
        assert!(!document.result.is_some_and(|result| result.allow));
    }

    #[tokio::test]
    async fn unreachable_decision_point() {
        let url = url::Url::parse("http://127.0.0.1:1/v1/data/app").expect("url");
        let authz = OpaAuthorizer::new(url, Duration::from_millis(500));
        assert_eq!(
            authz.authorize(&input(&[], "GET")).await,
            Err(AuthzError::Unreachable)
        );
    }
}
