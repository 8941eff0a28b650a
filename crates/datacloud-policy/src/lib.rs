//! DataCloud authorization rules shared by the policy decision point and the
//! registry service.
//!
//! # Purpose
//! Implements the `app` policy package: three boolean rules (`is_user`,
//! `is_admin`, `allow`) evaluated over a request descriptor and a static trust
//! document.
//!
//! # How it fits
//! The PDP service exposes these rules over an OPA-compatible Data API. The
//! registry service either queries the PDP over HTTP or embeds the same rules
//! in-process.
//!
//! # Key invariants
//! - Every undefined reference evaluates to `false`; evaluation never fails.
//! - `is_admin` implies `is_user`, and `is_admin` implies `allow`.
//! - Trust data is immutable once loaded.
//!
//! # Examples
//! ```rust
//! use datacloud_policy::{PolicyEngine, PolicyInput, TrustData};
//! use serde_json::json;
//!
//! let data = TrustData::from_json_str(
//!     r#"{"trusted_issuers": ["https://iam.example.org/"], "admin_entitlement": "admins"}"#,
//! )
//! .unwrap();
//! let engine = PolicyEngine::new(data);
//! let input = PolicyInput::from(json!({
//!     "user_info": {"iss": "https://iam.example.org/", "groups": ["admins"]},
//!     "path": "/api/v1/users/",
//!     "method": "DELETE"
//! }));
//! assert!(engine.evaluate(&input).allow);
//! ```

mod data;
mod engine;
mod errors;
mod input;
mod matcher;
mod rules;

pub use data::{Endpoint, TrustData};
pub use engine::PolicyEngine;
pub use errors::{PolicyError, PolicyResult};
pub use input::{PolicyInput, UserInfo};
pub use matcher::wildcard_match;
pub use rules::{Decision, Rule, allow, is_admin, is_user};

/// Name of the policy package served under `/v1/data/<package>`.
pub const PACKAGE: &str = "app";
