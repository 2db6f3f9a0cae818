//! Tracing setup for docqa binaries.
//!
//! Three entry points install a global subscriber:
//!
//! - [`init_telemetry`]: human-readable output
//! - [`init_json_telemetry`]: one JSON object per line, for log shippers
//! - [`init_with_otlp`]: human-readable output plus span export over OTLP/gRPC
//!
//! All of them write to stderr, honour `RUST_LOG` and fall back to `info`. A
//! second call in the same process returns
//! [`TelemetryError::AlreadyInitialized`].
//!
//! [`capture`] holds an in-memory span recorder for tests.

pub mod capture;

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, runtime, trace as sdktrace};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

pub use capture::{CaptureLayer, CapturedSpan, SpanCapture};

/// Level used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] TryInitError),

    #[error("failed to start OTLP exporter: {0}")]
    Exporter(#[from] opentelemetry::trace::TraceError),
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a human-readable subscriber tagged with `service_name`.
pub fn init_telemetry(service_name: &str) -> Result<(), TelemetryError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init()?;

    tracing::info!(service.name = service_name, "telemetry initialized");
    Ok(())
}

/// Install a subscriber that writes JSON lines, including the fields of the
/// current span and its parents.
pub fn init_json_telemetry(service_name: &str) -> Result<(), TelemetryError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_current_span(true).with_span_list(true).with_writer(std::io::stderr))
        .try_init()?;

    tracing::info!(service.name = service_name, "telemetry initialized");
    Ok(())
}

/// Install a human-readable subscriber and export spans to the OTLP
/// collector at `endpoint` (for example `http://localhost:4317`).
///
/// Must be called from within a Tokio runtime; the batch exporter runs on it.
pub fn init_with_otlp(service_name: &str, endpoint: &str) -> Result<(), TelemetryError> {
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint))
        .with_trace_config(
            sdktrace::config()
                .with_resource(Resource::new(vec![KeyValue::new("service.name", service_name.to_string())])),
        )
        .install_batch(runtime::Tokio)?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init()?;

    tracing::info!(service.name = service_name, otlp.endpoint = endpoint, "telemetry initialized");
    Ok(())
}

/// Flush pending spans and stop the OTLP exporter. A no-op when
/// [`init_with_otlp`] was not used.
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}
