//! Observability wiring shared by the DataCloud services.
//!
//! # Purpose
//! One entry point per process installs the log subscriber, the optional OTLP
//! span exporter and the Prometheus recorder. Request spans pick up the W3C
//! `traceparent` sent by callers so registry and PDP spans join one trace.
//!
//! # Notes
//! Installation happens once per process; later calls return the same metrics
//! handle. Spans are only exported when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
use axum::body::Body;
use axum::http::{HeaderMap, Request};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

static METRICS: OnceLock<PrometheusHandle> = OnceLock::new();
static SUBSCRIBER: OnceLock<()> = OnceLock::new();
static PROPAGATOR: OnceLock<()> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// Metric name and help text registered with the recorder at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDescription {
    pub kind: MetricKind,
    pub name: &'static str,
    pub help: &'static str,
}

impl MetricDescription {
    pub const fn counter(name: &'static str, help: &'static str) -> Self {
        Self {
            kind: MetricKind::Counter,
            name,
            help,
        }
    }

    pub const fn gauge(name: &'static str, help: &'static str) -> Self {
        Self {
            kind: MetricKind::Gauge,
            name,
            help,
        }
    }

    pub const fn histogram(name: &'static str, help: &'static str) -> Self {
        Self {
            kind: MetricKind::Histogram,
            name,
            help,
        }
    }

    fn describe(&self) {
        match self.kind {
            MetricKind::Counter => metrics::describe_counter!(self.name, self.help),
            MetricKind::Gauge => metrics::describe_gauge!(self.name, self.help),
            MetricKind::Histogram => metrics::describe_histogram!(self.name, self.help),
        }
    }
}

/// Identity attached to exported spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResource {
    pub name: String,
    pub version: String,
    pub instance: Option<String>,
    pub environment: Option<String>,
}

impl ServiceResource {
    /// `DC_INSTANCE_ID` falls back to `HOSTNAME`.
    pub fn from_env(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instance: std::env::var("DC_INSTANCE_ID")
                .or_else(|_| std::env::var("HOSTNAME"))
                .ok(),
            environment: std::env::var("DC_ENVIRONMENT").ok(),
        }
    }

    fn attributes(&self) -> Vec<KeyValue> {
        let mut attrs = vec![
            KeyValue::new("service.name", self.name.clone()),
            KeyValue::new("service.version", self.version.clone()),
        ];
        if let Some(instance) = &self.instance {
            attrs.push(KeyValue::new("service.instance.id", instance.clone()));
        }
        if let Some(environment) = &self.environment {
            attrs.push(KeyValue::new("deployment.environment", environment.clone()));
        }
        attrs
    }
}

/// Install the subscriber and the metrics recorder, then describe `metrics`.
///
/// `RUST_LOG` wins over `default_level` when set.
pub fn init_observability(
    service_name: &str,
    default_level: &str,
    metrics: &[MetricDescription],
) -> PrometheusHandle {
    SUBSCRIBER.get_or_init(|| {
        install_propagator();
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let registry = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false));
        let resource = ServiceResource::from_env(service_name);
        match otlp_endpoint().and_then(|endpoint| span_exporter(&endpoint, &resource)) {
            Some(provider) => {
                let tracer = provider.tracer(resource.name.clone());
                global::set_tracer_provider(provider);
                let _ = registry
                    .with(tracing_opentelemetry::layer().with_tracer(tracer))
                    .try_init();
            }
            None => {
                let _ = registry.try_init();
            }
        }
    });

    let handle = metrics_handle();
    for metric in metrics {
        metric.describe();
    }
    handle
}

fn otlp_endpoint() -> Option<String> {
    std::env::var(OTLP_ENDPOINT_ENV)
        .ok()
        .filter(|endpoint| !endpoint.trim().is_empty())
}

fn span_exporter(endpoint: &str, resource: &ServiceResource) -> Option<SdkTracerProvider> {
    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(err) => {
            eprintln!("otlp exporter disabled: {err}");
            return None;
        }
    };
    Some(
        SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(
                Resource::builder_empty()
                    .with_attributes(resource.attributes())
                    .build(),
            )
            .build(),
    )
}

fn metrics_handle() -> PrometheusHandle {
    METRICS
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(err) => {
                // The global recorder is taken; render from a detached one.
                tracing::warn!(error = %err, "prometheus recorder already installed");
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

fn install_propagator() {
    PROPAGATOR.get_or_init(|| global::set_text_map_propagator(TraceContextPropagator::new()));
}

/// Remote parent carried by `traceparent` / `tracestate`, if any.
pub fn trace_context_from_headers(headers: &HeaderMap) -> opentelemetry::Context {
    install_propagator();
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Span factory for `TraceLayer::make_span_with`.
///
/// Only the path is recorded; query strings may carry user filters.
pub fn http_request_span(request: &Request<Body>) -> tracing::Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let span = tracing::info_span!(
        "http.request",
        method = %request.method(),
        path = request.uri().path(),
        request_id
    );
    span.set_parent(trace_context_from_headers(request.headers()));
    span
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.to_str().ok()
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

pub fn metrics_router(handle: PrometheusHandle) -> axum::Router {
    axum::Router::new().route(
        "/metrics",
        axum::routing::get(move || std::future::ready(handle.render())),
    )
}

/// Serve `GET /metrics` on its own listener.
pub async fn serve_metrics(handle: PrometheusHandle, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics listening");
    axum::serve(listener, metrics_router(handle).into_make_service()).await
}
