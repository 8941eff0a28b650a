//! Registry HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures middleware, and defines the shared
//! application state injected into handlers.
//!
//! # Notes
//! User routes sit behind the access guard; the collection's `OPTIONS`, the
//! system routes and the API docs are public.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::api::types::{AuthModes, Maintainer, SystemInfo};
use crate::auth::AccessControl;
use crate::auth::guard::require_access;
use crate::store::UserStore;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::convert::Infallible;
use std::sync::Arc;
use tower::{Layer, ServiceExt};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

pub const API_VERSION: &str = "v1";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore + Send + Sync>,
    pub access: AccessControl,
    /// External base URL used to build pagination links.
    pub base_url: Arc<url::Url>,
    pub info: Arc<SystemInfo>,
    pub cors_origins: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(store: Arc<dyn UserStore + Send + Sync>, base_url: url::Url) -> Self {
        Self {
            store,
            access: AccessControl::disabled(),
            base_url: Arc::new(base_url),
            info: Arc::new(default_info()),
            cors_origins: Arc::new(Vec::new()),
        }
    }

    pub fn with_access(mut self, access: AccessControl) -> Self {
        self.access = access;
        self
    }

    pub fn with_info(mut self, info: SystemInfo) -> Self {
        self.info = Arc::new(info);
        self
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Arc::new(origins);
        self
    }
}

fn default_info() -> SystemInfo {
    SystemInfo {
        project_name: "app".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        api_version: API_VERSION.to_string(),
        maintainer: Maintainer::default(),
        auth: AuthModes {
            authn: None,
            authz: None,
        },
    }
}

/// CORS policy: `*` mirrors the request origin so credentials stay allowed.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::mirror_request()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| {
                let trimmed = origin.trim_end_matches('/');
                match HeaderValue::from_str(trimmed) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                        None
                    }
                }
            })
            .collect();
        AllowOrigin::list(values)
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// Apply CORS to preflights and regular requests. A plain `OPTIONS` (no
/// `Access-Control-Request-Method`) reaches its route so `Allow` is served.
async fn apply_cors(State(cors): State<CorsLayer>, request: Request, next: Next) -> Response {
    let is_plain_options = request.method() == Method::OPTIONS
        && !request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);
    if is_plain_options {
        return next.run(request).await;
    }
    let mut next = Some(next);
    let inner = tower::service_fn(move |request: Request| {
        let next = next.take();
        async move {
            Ok::<_, Infallible>(match next {
                Some(next) => next.run(request).await,
                None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            })
        }
    });
    match cors.layer(inner).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

pub fn build_router(state: AppState) -> Router {
    let guard = middleware::from_fn_with_state(state.clone(), require_access);
    // `OPTIONS` is added after the guard so the method list stays public.
    let collection = get(api::users::list_users)
        .post(api::users::create_user)
        .route_layer(guard.clone())
        .options(api::users::options_users);
    let users = Router::new()
        .route(api::users::USERS_PATH, collection.clone())
        .route("/api/v1/users/", collection)
        .route(
            "/api/v1/users/:user_id",
            get(api::users::get_user)
                .put(api::users::update_user)
                .delete(api::users::delete_user)
                .route_layer(guard),
        );

    Router::new()
        .route("/api/v1/system/info", get(api::system::system_info))
        .route("/api/v1/system/health", get(api::system::system_health))
        .merge(users)
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/api/v1/docs")
                .url("/api/v1/openapi.json", ApiDoc::openapi()),
        )
        .layer(middleware::from_fn_with_state(
            cors_layer(&state.cors_origins),
            apply_cors,
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(datacloud_observability::http_request_span),
        )
        .with_state(state)
}
