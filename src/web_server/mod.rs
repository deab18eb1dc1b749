//! Optional Prometheus scrape endpoint.

mod prometheus_metrics;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use prometheus::Registry;
use tracing::{info, warn};

use self::prometheus_metrics::metrics_handler;

pub const METRICS_ADDR_ENV: &str = "SYSPOLL_METRICS_ADDR";
const DEFAULT_METRICS_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 9464);

pub fn metrics_router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .layer(Extension(registry))
}

/// Bind address from [`METRICS_ADDR_ENV`], falling back to the default when
/// unset or unparsable.
pub fn metrics_addr() -> SocketAddr {
    let fallback = SocketAddr::from(DEFAULT_METRICS_ADDR);
    match std::env::var(METRICS_ADDR_ENV) {
        Ok(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!(%value, "invalid {}, using {}", METRICS_ADDR_ENV, fallback);
            fallback
        }),
        Err(_) => fallback,
    }
}

pub async fn start_prometheus_server(registry: Arc<Registry>, addr: SocketAddr) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!(%addr, error = %e, "failed to bind metrics endpoint");
            return;
        }
    };
    info!(%addr, "serving prometheus metrics");
    if let Err(e) = axum::serve(listener, metrics_router(registry)).await {
        warn!(error = %e, "metrics endpoint stopped");
    }
}
