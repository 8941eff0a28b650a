//! Request descriptor evaluated by the policy rules.
//!
//! # Purpose
//! Models the `input` document: the caller's identity claims plus the HTTP
//! method, path and body presence of the request being authorized.
//!
//! # Key invariants
//! - Conversion from arbitrary JSON never fails. Fields with a missing or
//!   unexpected type become undefined (`None` / empty), which the rules treat
//!   as `false`.
//! - `has_body` accepts a JSON boolean or the strings `"true"` / `"false"`.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identity claims of the caller, as produced by the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct UserInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    pub groups: Vec<String>,
    /// Remaining claims (`sub`, `name`, `email`, ...), passed through untouched.
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

impl UserInfo {
    pub fn new(iss: impl Into<String>, groups: Vec<String>) -> Self {
        Self {
            iss: Some(iss.into()),
            groups,
            claims: Map::new(),
        }
    }

    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.iter().any(|candidate| candidate == group)
    }
}

impl From<Value> for UserInfo {
    fn from(value: Value) -> Self {
        let Value::Object(mut claims) = value else {
            return Self::default();
        };
        let iss = claims
            .remove("iss")
            .and_then(|value| value.as_str().map(str::to_string));
        let groups = claims.remove("groups").map(groups_from).unwrap_or_default();
        Self {
            iss,
            groups,
            claims,
        }
    }
}

fn groups_from(value: Value) -> Vec<String> {
    // Groups may be encoded as either a string or array of strings.
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Value::String(group) => vec![group],
        _ => Vec::new(),
    }
}

/// The `input` document of a policy query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct PolicyInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_body: Option<bool>,
}

impl PolicyInput {
    pub fn new(
        user_info: Option<UserInfo>,
        path: impl Into<String>,
        method: impl Into<String>,
        has_body: bool,
    ) -> Self {
        Self {
            user_info,
            path: Some(path.into()),
            method: Some(method.into()),
            has_body: Some(has_body),
        }
    }

    pub fn issuer(&self) -> Option<&str> {
        self.user_info.as_ref().and_then(|info| info.iss.as_deref())
    }
}

impl From<Value> for PolicyInput {
    fn from(value: Value) -> Self {
        let Value::Object(mut fields) = value else {
            return Self::default();
        };
        let user_info = match fields.remove("user_info") {
            Some(value @ Value::Object(_)) => Some(UserInfo::from(value)),
            _ => None,
        };
        let path = take_string(&mut fields, "path");
        let method = take_string(&mut fields, "method");
        let has_body = fields.remove("has_body").and_then(parse_has_body);
        Self {
            user_info,
            path,
            method,
            has_body,
        }
    }
}

fn take_string(fields: &mut Map<String, Value>, name: &str) -> Option<String> {
    match fields.remove(name) {
        Some(Value::String(value)) => Some(value),
        _ => None,
    }
}

fn parse_has_body(value: Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
