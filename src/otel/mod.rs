//! Logging, metrics and trace setup.
//!
//! The terminal belongs to the TUI, so log lines are only written when a log
//! file is configured. Metric and trace exporters follow the usual `OTEL_*`
//! environment variables and stay no-ops when those are unset.

pub mod metrics;
pub mod tracing;

use std::{env, io, path::Path};

use opentelemetry::KeyValue;
use opentelemetry_otlp::{ExportConfig, Protocol};
use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use self::metrics::MetricsState;

pub const LOG_FILTER_ENV: &str = "SYSPOLL_LOG";
pub const LOG_FILE_ENV: &str = "SYSPOLL_LOG_FILE";

pub struct OtelState {
    pub metrics: MetricsState,
    pub tracer: Option<SdkTracerProvider>,
    // Flushes buffered log lines when dropped.
    _log_guard: Option<WorkerGuard>,
}

impl OtelState {
    /// Flushes and stops the exporters.
    pub fn shutdown(&self) {
        if let Some(tracer) = &self.tracer {
            if let Err(e) = tracer.shutdown() {
                ::tracing::debug!(error = %e, "tracer provider shutdown failed");
            }
        }
        if let Some(meter) = &self.metrics.meter {
            if let Err(e) = meter.shutdown() {
                ::tracing::debug!(error = %e, "meter provider shutdown failed");
            }
        }
    }
}

pub fn init(log_file: Option<&Path>) -> io::Result<OtelState> {
    let log_guard = init_logging(log_file)?;
    let tracer = tracing::create_tracer();
    let metrics = metrics::initialize();
    Ok(OtelState {
        metrics,
        tracer,
        _log_guard: log_guard,
    })
}

fn init_logging(log_file: Option<&Path>) -> io::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)?;
    Ok(guard)
}

pub(crate) fn resource() -> Resource {
    Resource::builder()
        .with_service_name("syspoll")
        .with_attribute(KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")))
        .build()
}

pub(crate) fn create_otlp_export_config() -> ExportConfig {
    let protocol = match env::var("OTEL_EXPORTER_OTLP_PROTOCOL").ok().as_deref() {
        Some("http/protobuf") => Protocol::HttpBinary,
        Some("http/json") => Protocol::HttpJson,
        _ => Protocol::Grpc,
    };
    ExportConfig {
        endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
        protocol,
        ..ExportConfig::default()
    }
}
