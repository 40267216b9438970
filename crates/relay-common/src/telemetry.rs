use std::collections::HashMap;

use opentelemetry::trace::TracerProvider as TracerProviderTrait;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{SpanExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where spans are exported when OTLP is enabled.
#[derive(Debug, Clone, Default)]
pub struct OtlpExport {
    /// Base URL of the collector; the exporter appends `/v1/traces`.
    pub endpoint: String,
    pub token: Option<String>,
}

/// Install the global subscriber: env-filtered fmt output, plus an OTLP span
/// exporter when `otlp` is set.
///
/// The returned provider must be kept alive for the lifetime of the process
/// and shut down before exit so buffered spans are flushed.
pub fn init_tracing(service_name: &str, otlp: Option<&OtlpExport>) -> Option<TracerProvider> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    let Some(otlp) = otlp.filter(|o| !o.endpoint.is_empty()) else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
        return None;
    };

    let exporter = match build_exporter(otlp) {
        Ok(e) => e,
        Err(err) => {
            eprintln!("OTLP exporter unavailable ({err}), logging to stdout only");
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .init();
            return None;
        }
    };

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_resource(Resource::new([KeyValue::new(
            "service.name",
            service_name.to_string(),
        )]))
        .build();

    let otel_layer =
        tracing_opentelemetry::layer().with_tracer(provider.tracer(service_name.to_string()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    tracing::info!(endpoint = %otlp.endpoint, service_name, "OTLP span export enabled");
    Some(provider)
}

fn build_exporter(otlp: &OtlpExport) -> Result<SpanExporter, opentelemetry::trace::TraceError> {
    let mut headers = HashMap::new();
    if let Some(token) = otlp.token.as_deref().filter(|t| !t.is_empty()) {
        headers.insert("Authorization".to_string(), format!("Bearer {token}"));
    }

    SpanExporter::builder()
        .with_http()
        .with_endpoint(otlp.endpoint.clone())
        .with_headers(headers)
        .build()
}
