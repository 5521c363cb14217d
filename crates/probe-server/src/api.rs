//! HTTP API: capture, graph retrieval, listing, health checks and Prometheus metrics
//!
//! Business endpoints answer with HTTP 200 and a `{code, msg, data}`
//! envelope; `code` is 0 on success and 1 on any failure. Graph retrieval
//! returns the SVG itself when it succeeds.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use probe_lib::{
    health::{ComponentStatus, HealthRegistry},
    models::{CaptureMode, CaptureRequest, GraphQuery},
    observability::ProbeMetrics,
    ProfileService,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

pub const CODE_OK: i32 = 0;
pub const CODE_ERROR: i32 = 1;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProfileService>,
    pub health_registry: HealthRegistry,
    pub metrics: ProbeMetrics,
    token: String,
}

impl AppState {
    pub fn new(
        service: Arc<ProfileService>,
        health_registry: HealthRegistry,
        metrics: ProbeMetrics,
        token: impl Into<String>,
    ) -> Self {
        Self {
            service,
            health_registry,
            metrics,
            token: token.into(),
        }
    }
}

/// Response body of every business endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i32,
    pub msg: String,
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    fn ok(data: T) -> Response {
        Json(Envelope {
            code: CODE_OK,
            msg: "success".to_string(),
            data: Some(data),
        })
        .into_response()
    }
}

fn envelope_error(msg: impl Into<String>) -> Response {
    let msg = msg.into();
    warn!(msg = %msg, "Request rejected");
    Json(Envelope::<()> {
        code: CODE_ERROR,
        msg,
        data: None,
    })
    .into_response()
}

/// Query string of a capture request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureQuery {
    pub mode: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub pod_name: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub seconds: u32,
    #[serde(default)]
    pub token: String,
}

impl CaptureQuery {
    fn into_request(self) -> probe_lib::Result<CaptureRequest> {
        Ok(CaptureRequest {
            mode: CaptureMode::from_str(&self.mode)?,
            cluster_name: self.cluster_name,
            namespace: self.namespace,
            pod_name: self.pod_name,
            port: self.port,
            addr: self.addr,
            seconds: self.seconds,
            token: self.token,
        })
    }
}

/// Query string of a listing request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub cluster_name: String,
    #[serde(default)]
    pub namespace: String,
}

/// Run a capture and return its artifact descriptors
async fn capture(
    State(state): State<Arc<AppState>>,
    query: Result<Query<CaptureQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(e) => return envelope_error(format!("invalid parameters: {e}")),
    };
    let request = match query.into_request() {
        Ok(request) => request,
        Err(e) => return envelope_error(format!("invalid parameters: {e}")),
    };
    if request.token != state.token {
        return envelope_error("invalid token");
    }

    match state.service.generate_capture(&request).await {
        Ok(descriptors) => Envelope::ok(descriptors),
        Err(e) => envelope_error(format!("capture failed: {e}")),
    }
}

/// Serve one stored image
async fn graph(
    State(state): State<Arc<AppState>>,
    query: Result<Query<GraphQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(e) => return envelope_error(format!("invalid parameters: {e}")),
    };

    match state.service.find_graph(&query).await {
        Ok(svg) => ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response(),
        Err(e) => envelope_error(format!("graph lookup failed: {e}")),
    }
}

/// List stored captures under a cluster and namespace
async fn captures(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(e) => return envelope_error(format!("invalid parameters: {e}")),
    };

    match state
        .service
        .list_captures(&query.cluster_name, &query.namespace)
        .await
    {
        Ok(entries) => Envelope::ok(entries),
        Err(e) => envelope_error(format!("listing failed: {e}")),
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/capture", get(capture))
        .route("/api/v1/graph", get(graph))
        .route("/api/v1/captures", get(captures))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
