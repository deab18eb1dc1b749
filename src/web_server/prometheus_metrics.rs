use axum::{http::StatusCode, response::IntoResponse, Extension};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

pub async fn metrics_handler(Extension(registry): Extension<Arc<Registry>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", encoder.format_type())],
            buffer,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod prometheus_metrics_tests {
    use super::*;
    use crate::web_server::metrics_router;
    use axum::body::Body;
    use http::Request;
    use prometheus::{IntCounterVec, Opts};
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn test_metrics_route_serves_registry_contents() {
        let registry = Arc::new(Registry::new());
        let runs = IntCounterVec::new(Opts::new("runs", "probe runs"), &["system"]).unwrap();
        registry.register(Box::new(runs.clone())).unwrap();
        runs.with_label_values(&["api"]).inc_by(3);

        let resp = metrics_router(registry)
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(StatusCode::OK, resp.status());
        assert!(resp.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));

        let body_bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert!(body.contains(r#"runs{system="api"} 3"#), "{}", body);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let resp = metrics_router(Arc::new(Registry::new()))
            .oneshot(
                Request::builder()
                    .uri("/-/reload")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(StatusCode::NOT_FOUND, resp.status());
    }
}
