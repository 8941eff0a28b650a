//! Trust data consumed by the rules.
//!
//! # Purpose
//! Holds the static trust configuration: trusted issuers, the entitlement that
//! grants administrative access, and the endpoint/method pairs regular users
//! may call.
//!
//! # Key invariants
//! - Issuers are compared ignoring one trailing `/`.
//! - Endpoint paths may contain `*` wildcards; methods compare case-insensitively.
//! - An endpoint with `has_body` set only matches requests whose body presence
//!   is known and equal.
use crate::{PolicyError, PolicyResult, matcher::wildcard_match};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub path: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_body: Option<bool>,
}

impl Endpoint {
    pub fn new(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            has_body: None,
        }
    }

    pub fn with_body(mut self, has_body: bool) -> Self {
        self.has_body = Some(has_body);
        self
    }

    pub fn matches(&self, method: &str, path: &str, has_body: Option<bool>) -> bool {
        if !self.method.eq_ignore_ascii_case(method) {
            return false;
        }
        if let Some(required) = self.has_body
            && has_body != Some(required)
        {
            return false;
        }
        wildcard_match(&self.path, path)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustData {
    #[serde(default)]
    pub trusted_issuers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_entitlement: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl TrustData {
    pub fn from_json_str(raw: &str) -> PolicyResult<Self> {
        let data: TrustData = serde_json::from_str(raw)?;
        data.validate()?;
        Ok(data)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> PolicyResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let data = Self::from_json_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            issuers = data.trusted_issuers.len(),
            endpoints = data.endpoints.len(),
            "trust data loaded"
        );
        Ok(data)
    }

    pub fn validate(&self) -> PolicyResult<()> {
        if self
            .trusted_issuers
            .iter()
            .any(|issuer| issuer.trim().is_empty())
        {
            return Err(PolicyError::InvalidData("blank trusted issuer".to_string()));
        }
        if let Some(entitlement) = &self.admin_entitlement
            && entitlement.trim().is_empty()
        {
            return Err(PolicyError::InvalidData(
                "blank admin entitlement".to_string(),
            ));
        }
        for endpoint in &self.endpoints {
            if endpoint.path.trim().is_empty() {
                return Err(PolicyError::InvalidData("empty endpoint path".to_string()));
            }
            if endpoint.method.trim().is_empty() {
                return Err(PolicyError::InvalidData(format!(
                    "empty method for endpoint {}",
                    endpoint.path
                )));
            }
        }
        Ok(())
    }

    pub fn trusts_issuer(&self, issuer: &str) -> bool {
        let issuer = normalize_issuer(issuer);
        self.trusted_issuers
            .iter()
            .any(|trusted| normalize_issuer(trusted) == issuer)
    }

    pub fn permits(&self, method: &str, path: &str, has_body: Option<bool>) -> bool {
        self.endpoints
            .iter()
            .any(|endpoint| endpoint.matches(method, path, has_body))
    }
}

fn normalize_issuer(issuer: &str) -> &str {
    issuer.strip_suffix('/').unwrap_or(issuer)
}
