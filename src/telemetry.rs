//! Logging and metrics export for lease-hosts.
//!
//! - `tracing` with an `EnvFilter` (`RUST_LOG` wins over the configured level)
//! - text or JSON log lines
//! - Prometheus exporter (with `prometheus` feature)
//! - OTLP span export (with `otel` feature)

#[cfg(feature = "prometheus")]
use std::net::SocketAddr;
#[cfg(any(feature = "prometheus", feature = "otel"))]
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{LogFormat, TelemetryConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Flushes exporters when dropped. Keep it alive for the life of the process.
#[must_use = "dropping the guard flushes and stops span export"]
#[derive(Default)]
pub struct TelemetryGuard {
    #[cfg(feature = "otel")]
    tracer_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        if let Some(provider) = self.tracer_provider.take() {
            if let Err(e) = provider.shutdown() {
                tracing::warn!("Error shutting down tracer provider: {}", e);
            }
        }
    }
}

/// Install the global subscriber and, if configured, the metrics exporter.
pub fn init(config: &TelemetryConfig) -> Result<TelemetryGuard, BoxError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    #[allow(unused_mut)]
    let mut guard = TelemetryGuard::default();
    #[allow(unused_mut)]
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![fmt_layer];

    #[cfg(feature = "otel")]
    if let Some(ref otel_config) = config.opentelemetry {
        let (layer, provider) = otel_layer(otel_config)?;
        layers.push(layer);
        guard.tracer_provider = Some(provider);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()?;

    #[cfg(feature = "otel")]
    if let Some(ref otel_config) = config.opentelemetry {
        info!(endpoint = %otel_config.endpoint, "OpenTelemetry tracing enabled");
    }

    #[cfg(feature = "prometheus")]
    if let Some(addr) = config.prometheus_addr {
        start_prometheus_exporter(addr)?;
    }

    Ok(guard)
}

#[cfg(feature = "otel")]
fn otel_layer(
    otel_config: &crate::config::OpenTelemetryConfig,
) -> Result<
    (
        Box<dyn Layer<Registry> + Send + Sync>,
        opentelemetry_sdk::trace::SdkTracerProvider,
    ),
    BoxError,
> {
    use opentelemetry::trace::TracerProvider;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk as otlp_sdk;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otel_config.endpoint)
        .build()?;

    let resource = otlp_sdk::Resource::builder()
        .with_attributes([
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                otel_config.service_name.clone(),
            ),
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            ),
        ])
        .build();

    let provider = otlp_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("lease-hosts");
    let layer = tracing_opentelemetry::layer().with_tracer(tracer).boxed();
    Ok((layer, provider))
}

#[cfg(feature = "prometheus")]
fn start_prometheus_exporter(addr: SocketAddr) -> Result<(), BoxError> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!(%addr, "Prometheus metrics exporter started");

    Ok(())
}
