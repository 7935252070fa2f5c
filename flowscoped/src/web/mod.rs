//! The HTTP API consumed by the web-based Sankey visualizer. Everything
//! lives under `/api/v1`, answers JSON, and is fully permissive about
//! origins so the visualizer can be served from anywhere.

mod handlers;
mod types;

pub use types::{ErrorResponse, FlowResponse, FlowsResponse, StatsResponse};

use crate::store::FlowStore;
use anyhow::Result;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub struct AppState {
    pub store: Arc<FlowStore>,
    /// IPv6 prefix length used when grouping addresses into subnets.
    pub v6_prefix_len: u8,
}

/// Error responses carry a machine-readable body alongside the status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: String,
}

impl ApiError {
    pub fn bad_request(message: &str, details: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
            details: details.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            code: self.status.as_u16(),
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/api/v1/stats", get(handlers::stats))
        .route("/api/v1/flows", get(handlers::flows))
        .route("/api/v1/sankey", get(handlers::sankey))
        .route("/api/v1/interfaces", get(handlers::interfaces))
        .route("/health", get(|| async { "OK" }))
        .layer(cors)
        .with_state(state)
}

/// Runs the API server until the process exits. Designed for
/// `tokio::spawn`.
pub async fn serve(store: Arc<FlowStore>, port: u16, v6_prefix_len: u8) -> Result<()> {
    let state = Arc::new(AppState {
        store,
        v6_prefix_len,
    });
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("API server listening on port {port}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use flowscope_types::{Flow, FlowVersion};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let store = Arc::new(FlowStore::new(1000));
        store.add(vec![
            test_flow("10.0.0.1", "8.8.8.8", 53, 17, 120),
            test_flow("192.168.1.5", "1.1.1.1", 443, 6, 4000),
        ]);
        router(Arc::new(AppState {
            store,
            v6_prefix_len: 56,
        }))
    }

    fn test_flow(src: &str, dst: &str, dport: u16, proto: u8, bytes: u64) -> Flow {
        Flow {
            version: FlowVersion::V5,
            src_addr: src.parse().unwrap(),
            dst_addr: dst.parse().unwrap(),
            src_port: 50000,
            dst_port: dport,
            protocol: proto,
            bytes,
            packets: 2,
            input_if: 1,
            output_if: 3,
            exporter_ip: "192.0.2.1".parse().unwrap(),
            received_at: chrono::Utc::now(),
            ..Default::default()
        }
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_router()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let (status, body) = get_json(test_router(), "/api/v1/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalFlows"], 2);
        assert_eq!(body["v5Flows"], 2);
        assert_eq!(body["currentFlows"], 2);
        assert_eq!(body["maxFlows"], 1000);
    }

    #[tokio::test]
    async fn test_flows_endpoint_with_filter() {
        let (status, body) = get_json(
            test_router(),
            "/api/v1/flows?filter=src=10.0.0.0/8&sort=bytes&asc=false&limit=10",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["filtered"], 1);
        let flows = body["flows"].as_array().unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0]["srcAddr"], "10.0.0.1");
        assert_eq!(flows[0]["service"], "dns");
        assert_eq!(flows[0]["version"], "NetFlow v5");
    }

    #[tokio::test]
    async fn test_flows_invalid_filter_is_400() {
        let (status, body) = get_json(test_router(), "/api/v1/flows?filter=src%3D").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid filter");
        assert!(body["details"].as_str().unwrap().contains("invalid"));
    }

    #[tokio::test]
    async fn test_sankey_invalid_filter_is_400() {
        let (status, body) =
            get_json(test_router(), "/api/v1/sankey?mode=ip-to-ip&filter=src%3D").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["details"].as_str().unwrap().contains("invalid"));
    }

    #[tokio::test]
    async fn test_sankey_invalid_mode_is_400() {
        let (status, body) = get_json(test_router(), "/api/v1/sankey?mode=bogus").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid mode");
    }

    #[tokio::test]
    async fn test_sankey_ip_to_ip() {
        let (status, body) = get_json(test_router(), "/api/v1/sankey?mode=ip-to-ip&topN=10").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "ip-to-ip");
        assert_eq!(body["links"].as_array().unwrap().len(), 2);
        assert_eq!(body["nodes"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_sankey_ip_version_folds_into_filter() {
        let (status, body) =
            get_json(test_router(), "/api/v1/sankey?mode=ip-to-ip&ipVersion=v6").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["links"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_interfaces_endpoint() {
        let (status, body) = get_json(test_router(), "/api/v1/interfaces").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["wanId"], 3);
        assert_eq!(body["exporters"].as_array().unwrap().len(), 1);
    }
}
