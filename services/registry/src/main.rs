//! DataCloud user registry entry point.
//!
//! # Purpose
//! Wires configuration, storage and access control into the HTTP router, then
//! serves the API and the metrics endpoint until `ctrl_c`.
use anyhow::Context;
use datacloud_observability::MetricDescription;
use datacloud_policy::PolicyEngine;
use registry::api::types::{AuthModes, Maintainer, SystemInfo};
use registry::app::{API_VERSION, AppState, build_router};
use registry::auth::AccessControl;
use registry::auth::authz::{Authorizer, EmbeddedAuthorizer, OpaAuthorizer};
use registry::auth::oidc::{OidcSettings, OidcValidator};
use registry::config::{AuthzMode, RegistryConfig, StorageBackend};
use registry::store::UserStore;
use registry::store::memory::InMemoryStore;
use registry::store::postgres::PostgresStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const METRICS: &[MetricDescription] = &[
    MetricDescription::counter(
        "datacloud_registry_authz_decisions_total",
        "Authorization decisions, by mode and result",
    ),
    MetricDescription::counter(
        "datacloud_registry_authn_failures_total",
        "Bearer tokens rejected by the authenticator",
    ),
    MetricDescription::counter(
        "datacloud_registry_user_changes_total",
        "User record changes, by operation",
    ),
    MetricDescription::gauge(
        "datacloud_registry_users_total",
        "Users held by the in-memory store",
    ),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RegistryConfig::from_env_or_yaml().context("registry config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: RegistryConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = datacloud_observability::init_observability(
        "datacloud-registry",
        &config.log_level,
        METRICS,
    );
    let state = build_state(&config).await?;
    let metrics_task = tokio::spawn(datacloud_observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let app = build_router(state);
    let addr = config.bind_addr;
    tracing::info!(%addr, "user registry listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
        }
        _ = &mut shutdown => {}
    }

    metrics_task.abort();
    let _ = metrics_task.await;
    Ok(())
}

async fn build_state(config: &RegistryConfig) -> anyhow::Result<AppState> {
    let store: Arc<dyn UserStore + Send + Sync> = match config.storage {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("postgres configuration missing")?;
            Arc::new(PostgresStore::connect(pg).await.context("connect postgres")?)
        }
    };
    tracing::info!(backend = store.backend_name(), durable = store.is_durable(), "user store ready");

    let access = build_access(config)?;
    let info = SystemInfo {
        project_name: config.project_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        api_version: API_VERSION.to_string(),
        maintainer: Maintainer {
            name: config.maintainer.name.clone(),
            url: config.maintainer.url.clone(),
            email: config.maintainer.email.clone(),
        },
        auth: AuthModes {
            authn: config.authn_mode.map(|mode| mode.as_str().to_string()),
            authz: config.authz_mode.map(|mode| mode.as_str().to_string()),
        },
    };

    Ok(AppState::new(store, config.base_url.clone())
        .with_access(access)
        .with_info(info)
        .with_cors_origins(config.cors_origins.clone()))
}

fn build_access(config: &RegistryConfig) -> anyhow::Result<AccessControl> {
    tracing::info!(count = config.trusted_idps.len(), "trusted identity providers configured");
    let Some(authn_mode) = config.authn_mode else {
        tracing::warn!("no authentication");
        return Ok(AccessControl::disabled());
    };
    tracing::info!(mode = authn_mode.as_str(), "authentication enabled");
    if config.trusted_idps.is_empty() {
        tracing::warn!("authentication enabled without trusted identity providers");
    }

    let mut settings = OidcSettings::new(
        config.trusted_idps.clone(),
        config.oidc_allowed_algorithms.clone(),
    );
    settings.audience = config.oidc_audience.clone();
    settings.http_timeout = Duration::from_millis(config.idp_timeout_ms);

    let authorizer: Option<Arc<dyn Authorizer>> = match config.authz_mode {
        None => {
            tracing::warn!("no authorization");
            None
        }
        Some(AuthzMode::Opa) => Some(Arc::new(OpaAuthorizer::new(
            config.opa_authz_url.clone(),
            Duration::from_millis(config.opa_timeout_ms),
        ))),
        Some(AuthzMode::Embedded) => {
            let engine = PolicyEngine::from_path(&config.policy_data_path).with_context(|| {
                format!(
                    "load trust data from {}",
                    config.policy_data_path.display()
                )
            })?;
            Some(Arc::new(EmbeddedAuthorizer::new(engine)))
        }
    };
    if let Some(authorizer) = &authorizer {
        tracing::info!(mode = authorizer.mode(), "authorization enabled");
    }

    Ok(AccessControl {
        authenticator: Some(OidcValidator::new(settings)),
        authorizer,
    })
}
