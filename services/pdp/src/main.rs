//! DataCloud policy decision point entry point.
//!
//! # Purpose
//! Loads configuration and trust data, then serves the OPA Data API and the
//! metrics endpoint until `ctrl_c`.
use anyhow::Context;
use datacloud_observability::MetricDescription;
use datacloud_policy::PolicyEngine;
use pdp::app::{AppState, build_router};
use pdp::config::PdpConfig;
use std::future::Future;

const METRICS: &[MetricDescription] = &[
    MetricDescription::counter(
        "datacloud_pdp_decisions_total",
        "Policy decisions served, by rule and result",
    ),
    MetricDescription::histogram(
        "datacloud_pdp_decision_seconds",
        "Time spent evaluating a rule",
    ),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PdpConfig::from_env_or_yaml().context("pdp config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: PdpConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle =
        datacloud_observability::init_observability("datacloud-pdp", &config.log_level, METRICS);
    let state = build_state(&config)?;
    let metrics_task = tokio::spawn(datacloud_observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let app = build_router(state);
    let addr = config.bind_addr;
    tracing::info!(%addr, package = %config.package, "policy decision point listening");
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

fn build_state(config: &PdpConfig) -> anyhow::Result<AppState> {
    let engine = PolicyEngine::from_path(&config.data_path)
        .with_context(|| format!("load trust data from {}", config.data_path.display()))?;
    Ok(AppState {
        engine,
        package: config.package.clone(),
    })
}
