use std::env;

use opentelemetry::global;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{BatchSpanProcessor, SdkTracerProvider};
use tracing::{debug, warn};

use super::{create_otlp_export_config, resource};

pub fn create_tracer() -> Option<SdkTracerProvider> {
    let provider = match env::var("OTEL_TRACES_EXPORTER").ok().as_deref() {
        Some("otlp") => {
            let export_config = create_otlp_export_config();
            let span_exporter = match export_config.protocol {
                opentelemetry_otlp::Protocol::Grpc => {
                    debug!("Using OTLP gRPC exporter");
                    SpanExporter::builder()
                        .with_tonic()
                        .with_export_config(export_config)
                        .build()
                }
                _ => {
                    debug!("Using OTLP HTTP exporter");
                    let base_endpoint = export_config
                        .endpoint
                        .clone()
                        .unwrap_or_else(|| "http://localhost:4318".to_string());
                    SpanExporter::builder()
                        .with_http()
                        .with_export_config(export_config)
                        .with_endpoint(format!("{}/v1/traces", base_endpoint.trim_end_matches('/')))
                        .build()
                }
            };
            match span_exporter {
                Ok(span_exporter) => {
                    let processor = BatchSpanProcessor::builder(span_exporter).build();
                    SdkTracerProvider::builder()
                        .with_span_processor(processor)
                        .with_resource(resource())
                        .build()
                }
                Err(e) => {
                    warn!(error = %e, "Failed to build OTLP span exporter, traces disabled");
                    return None;
                }
            }
        }
        Some("stdout") => {
            let processor =
                BatchSpanProcessor::builder(opentelemetry_stdout::SpanExporter::default()).build();
            SdkTracerProvider::builder()
                .with_span_processor(processor)
                .with_resource(resource())
                .build()
        }
        _ => return None,
    };
    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TraceContextPropagator::new());
    Some(provider)
}
