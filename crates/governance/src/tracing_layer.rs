//! Distributed tracing configuration.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use playgate_core::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Configure distributed tracing with OpenTelemetry and stdout logging.
///
/// Logs are plain text unless `json_logs` is set.
pub fn configure_tracing(json_logs: bool) -> Result<()> {
    // Basic EnvFilter
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,playgate=debug".into()),
    );

    // Exactly one of the stdout layers is active.
    let text_layer = (!json_logs).then(|| tracing_subscriber::fmt::layer());
    let json_layer = json_logs.then(|| tracing_subscriber::fmt::layer().json());

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(text_layer)
        .with(json_layer);

    // Check OTLP endpoint
    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        let provider = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint.clone()),
            )
            .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "playgate"),
            ])))
            .install_batch(runtime::Tokio)
            .map_err(|e| Error::internal(format!("Failed to install OTLP pipeline: {}", e)))?;

        let tracer = provider.tracer("playgate");
        opentelemetry::global::set_tracer_provider(provider);
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        registry.with(otel_layer).init();
        tracing::info!(endpoint = %endpoint, "OpenTelemetry tracing initialized");
    } else {
        registry.init();
    }

    Ok(())
}
