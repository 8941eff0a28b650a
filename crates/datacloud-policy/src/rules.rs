//! The `app` package rules.
//!
//! # Key invariants
//! - `is_user`: the caller's issuer is trusted.
//! - `is_admin`: `is_user` and the caller holds the admin entitlement.
//! - `allow`: `is_admin`, or `is_user` and the request matches a permitted
//!   endpoint.
//! - Undefined inputs never raise; they fall back to `false`.
use crate::{PolicyInput, TrustData};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Allow,
    IsAdmin,
    IsUser,
}

impl Rule {
    pub const ALL: [Rule; 3] = [Rule::Allow, Rule::IsAdmin, Rule::IsUser];

    pub fn as_str(self) -> &'static str {
        match self {
            Rule::Allow => "allow",
            Rule::IsAdmin => "is_admin",
            Rule::IsUser => "is_user",
        }
    }

    pub fn evaluate(self, input: &PolicyInput, data: &TrustData) -> bool {
        match self {
            Rule::Allow => allow(input, data),
            Rule::IsAdmin => is_admin(input, data),
            Rule::IsUser => is_user(input, data),
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Rule {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "allow" => Ok(Rule::Allow),
            "is_admin" => Ok(Rule::IsAdmin),
            "is_user" => Ok(Rule::IsUser),
            _ => Err(()),
        }
    }
}

/// Result of evaluating every rule of the package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allow: bool,
    pub is_admin: bool,
    pub is_user: bool,
}

impl Decision {
    pub fn get(&self, rule: Rule) -> bool {
        match rule {
            Rule::Allow => self.allow,
            Rule::IsAdmin => self.is_admin,
            Rule::IsUser => self.is_user,
        }
    }
}

pub fn is_user(input: &PolicyInput, data: &TrustData) -> bool {
    input
        .issuer()
        .is_some_and(|issuer| data.trusts_issuer(issuer))
}

pub fn is_admin(input: &PolicyInput, data: &TrustData) -> bool {
    let Some(entitlement) = data.admin_entitlement.as_deref() else {
        return false;
    };
    is_user(input, data)
        && input
            .user_info
            .as_ref()
            .is_some_and(|info| info.has_group(entitlement))
}

pub fn allow(input: &PolicyInput, data: &TrustData) -> bool {
    if is_admin(input, data) {
        return true;
    }
    let (Some(method), Some(path)) = (input.method.as_deref(), input.path.as_deref()) else {
        return false;
    };
    is_user(input, data) && data.permits(method, path, input.has_body)
}
