//! Registry authentication and authorization.
//!
//! # Purpose
//! Groups bearer token validation, the authorization backends, and the
//! request guard that chains them in front of the user routes.
pub mod authz;
pub mod guard;
pub mod oidc;

use authz::Authorizer;
use oidc::OidcValidator;
use std::sync::Arc;

/// Access control applied to protected routes.
///
/// `authorizer` is only consulted when `authenticator` is set.
#[derive(Clone, Default)]
pub struct AccessControl {
    pub authenticator: Option<OidcValidator>,
    pub authorizer: Option<Arc<dyn Authorizer>>,
}

impl AccessControl {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.authenticator.is_some()
    }
}
