// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Read-only control/status surface plus the administrative re-scan
//! trigger. The handlers only read the shared stores and issue live chain
//! queries; relaying always goes through the orchestrator's dedup guard.

use crate::with_metrics;
use crate::{
    error::BridgeError,
    metrics::BridgeMetrics,
    server::handler::{
        BridgeRequestHandlerTrait, ProcessedResponse, ReprocessRequest, ReprocessResponse,
        StatusResponse, VerifyResponse,
    },
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, instrument};

pub mod handler;

#[cfg(test)]
pub(crate) mod mock_handler;

pub const STATUS_PATH: &str = "/status";
pub const PROCESSED_PATH: &str = "/processed";
pub const VERIFY_PATH: &str = "/verify/:id";
pub const REPROCESS_PATH: &str = "/reprocess";
pub const METRICS_PATH: &str = "/metrics";

pub fn run_server(
    socket_address: &SocketAddr,
    handler: impl BridgeRequestHandlerTrait + Sync + Send + 'static,
    metrics: Arc<BridgeMetrics>,
    registry: Arc<Registry>,
) -> tokio::task::JoinHandle<()> {
    let socket_address = *socket_address;
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(socket_address).await.unwrap();
        info!("Status server listening on {}", socket_address);
        axum::serve(
            listener,
            make_router(Arc::new(handler), metrics, registry).into_make_service(),
        )
        .await
        .unwrap();
    })
}

pub(crate) fn make_router(
    handler: Arc<impl BridgeRequestHandlerTrait + Sync + Send + 'static>,
    metrics: Arc<BridgeMetrics>,
    registry: Arc<Registry>,
) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route(STATUS_PATH, get(handle_status))
        .route(PROCESSED_PATH, get(handle_processed))
        .route(VERIFY_PATH, get(handle_verify))
        .route(REPROCESS_PATH, post(handle_reprocess))
        .route(METRICS_PATH, get(handle_metrics))
        .with_state((handler, metrics, registry))
}

impl axum::response::IntoResponse for BridgeError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            BridgeError::TxNotFound => StatusCode::NOT_FOUND,
            BridgeError::InvalidTxHash | BridgeError::Generic(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, format!("Something went wrong: {:?}", self)).into_response()
    }
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

type ServerState<H> = (Arc<H>, Arc<BridgeMetrics>, Arc<Registry>);

#[instrument(level = "error", skip_all)]
async fn handle_status<H: BridgeRequestHandlerTrait + Sync + Send>(
    State((handler, metrics, _)): State<ServerState<H>>,
) -> Result<Json<StatusResponse>, BridgeError> {
    with_metrics!(metrics.clone(), "status", handler.handle_status()).await
}

#[instrument(level = "error", skip_all)]
async fn handle_processed<H: BridgeRequestHandlerTrait + Sync + Send>(
    State((handler, metrics, _)): State<ServerState<H>>,
) -> Result<Json<ProcessedResponse>, BridgeError> {
    with_metrics!(metrics.clone(), "processed", handler.handle_processed()).await
}

#[instrument(level = "error", skip_all, fields(id = id))]
async fn handle_verify<H: BridgeRequestHandlerTrait + Sync + Send>(
    Path(id): Path<String>,
    State((handler, metrics, _)): State<ServerState<H>>,
) -> Result<Json<VerifyResponse>, BridgeError> {
    with_metrics!(metrics.clone(), "verify", handler.handle_verify(id)).await
}

#[instrument(level = "error", skip_all)]
async fn handle_reprocess<H: BridgeRequestHandlerTrait + Sync + Send>(
    State((handler, metrics, _)): State<ServerState<H>>,
    Json(request): Json<ReprocessRequest>,
) -> Result<Json<ReprocessResponse>, BridgeError> {
    with_metrics!(metrics.clone(), "reprocess", handler.handle_reprocess(request)).await
}

async fn handle_metrics<H: BridgeRequestHandlerTrait + Sync + Send>(
    State((_, _, registry)): State<ServerState<H>>,
) -> Result<String, BridgeError> {
    TextEncoder::new()
        .encode_to_string(&registry.gather())
        .map_err(|e| BridgeError::InternalError(format!("metrics encoding: {e}")))
}

#[macro_export]
macro_rules! with_metrics {
    ($metrics:expr, $type_:expr, $func:expr) => {
        async move {
            let _timer = $metrics
                .request_latency
                .with_label_values(&[$type_])
                .start_timer();
            $metrics
                .requests_received
                .with_label_values(&[$type_])
                .inc();
            $metrics
                .requests_inflight
                .with_label_values(&[$type_])
                .inc();

            let result = $func.await;

            match &result {
                Ok(_) => {
                    $metrics.requests_ok.with_label_values(&[$type_]).inc();
                }
                Err(e) => {
                    tracing::info!("{} request failed: {:?}", $type_, e);
                    $metrics.err_requests.with_label_values(&[$type_]).inc();
                }
            }

            $metrics
                .requests_inflight
                .with_label_values(&[$type_])
                .dec();
            result
        }
    };
}

#[cfg(test)]
mod tests {
    use super::mock_handler::MockBridgeRequestHandler;
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_router(handler: MockBridgeRequestHandler) -> Router {
        let registry = Registry::new();
        let metrics = Arc::new(BridgeMetrics::new(&registry));
        make_router(Arc::new(handler), metrics, Arc::new(registry))
    }

    #[tokio::test]
    async fn test_health_check() {
        let router = test_router(MockBridgeRequestHandler::new());
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_processed_route() {
        let handler = MockBridgeRequestHandler::new();
        handler.set_processed(vec!["0xabc".to_string(), "t1".to_string()]);
        let router = test_router(handler);

        let response = router
            .oneshot(Request::get("/processed").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let parsed: ProcessedResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.processed_count, 2);
        assert_eq!(parsed.processed, vec!["0xabc", "t1"]);
    }

    #[tokio::test]
    async fn test_verify_route_passes_id() {
        let handler = MockBridgeRequestHandler::new();
        let router = test_router(handler);

        let response = router
            .oneshot(Request::get("/verify/0xabc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let parsed: VerifyResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.id, "0xabc");
    }

    #[tokio::test]
    async fn test_reprocess_route_roundtrip() {
        let handler = MockBridgeRequestHandler::new();
        let router = test_router(handler.clone());

        let response = router
            .oneshot(
                Request::post("/reprocess")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"fromBlock": 5, "toBlock": 10}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(handler.reprocess_requests(), vec![(5, 10)]);
    }

    #[tokio::test]
    async fn test_error_maps_to_status_code() {
        let handler = MockBridgeRequestHandler::new();
        handler.set_verify_error(BridgeError::TxNotFound);
        let router = test_router(handler);

        let response = router
            .oneshot(Request::get("/verify/0xmissing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_route_serves_prometheus_text() {
        let registry = Registry::new();
        let metrics = Arc::new(BridgeMetrics::new(&registry));
        metrics.eth_watcher_received_events.inc();
        let router = make_router(
            Arc::new(MockBridgeRequestHandler::new()),
            metrics,
            Arc::new(registry),
        );

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("bridge_eth_watcher_received_events"));
    }
}
