// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::Result;
use cbx_config::AppConfig;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tracing::Level;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Registry;

const SERVICE_NAME_VAR: &str = "OTEL_SERVICE_NAME";

/// `OTEL_SERVICE_NAME` wins over the configured node name
fn service_name(configured: &str, from_env: Option<String>) -> String {
    from_env
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| configured.to_string())
}

fn otel_layer(
    endpoint: &str,
    service: String,
) -> Result<OpenTelemetryLayer<Registry, SdkTracer>> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_protocol(Protocol::Grpc)
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(Resource::builder().with_service_name(service.clone()).build())
        .build();

    Ok(tracing_opentelemetry::layer().with_tracer(provider.tracer(service)))
}

/// Install the fmt subscriber. Spans are also exported over OTLP when a
/// collector endpoint is configured.
pub fn setup_tracing(config: &AppConfig, log_level: Level) -> Result<()> {
    let telemetry = match config.otel() {
        Some(endpoint) => {
            let service = service_name(config.name(), std::env::var(SERVICE_NAME_VAR).ok());
            Some(otel_layer(&endpoint, service)?)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(telemetry)
        .with(tracing_subscriber::fmt::layer())
        .with(LevelFilter::from_level(log_level))
        .init();

    Ok(())
}
