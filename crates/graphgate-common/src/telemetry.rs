use std::collections::HashMap;

use opentelemetry::trace::TracerProvider as TracerProviderTrait;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where spans go besides stdout.
#[derive(Debug, Clone, Default)]
pub struct OtlpExport {
    /// Base URL of an OTLP/HTTP collector; the exporter appends `/v1/traces`.
    pub endpoint: Option<String>,
    pub token: Option<String>,
}

/// Install the global subscriber: `RUST_LOG`-driven filter (default `info`),
/// a fmt layer, and an OpenTelemetry layer when `export.endpoint` is set.
///
/// The returned provider must be kept alive and shut down before exit so
/// batched spans are flushed.
pub fn init_tracing(service_name: &str, export: &OtlpExport) -> Option<TracerProvider> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let provider = export
        .endpoint
        .as_deref()
        .and_then(|endpoint| build_provider(service_name, endpoint, export.token.as_deref()));

    let otel_layer = provider.as_ref().map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.tracer(service_name.to_string()))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer)
        .init();

    if let Some(endpoint) = export.endpoint.as_deref() {
        if provider.is_some() {
            tracing::info!(endpoint, service_name, "OTLP tracing enabled");
        } else {
            tracing::warn!(endpoint, "OTLP exporter unavailable, logging to stdout only");
        }
    }
    provider
}

fn build_provider(service_name: &str, endpoint: &str, token: Option<&str>) -> Option<TracerProvider> {
    let mut headers = HashMap::new();
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        headers.insert("Authorization".to_string(), format!("Bearer {token}"));
    }

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .with_headers(headers)
        .build()
    {
        Ok(e) => e,
        Err(err) => {
            eprintln!("failed to create OTLP exporter: {err}");
            return None;
        }
    };

    Some(
        TracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_resource(Resource::new([KeyValue::new(
                "service.name",
                service_name.to_string(),
            )]))
            .build(),
    )
}
