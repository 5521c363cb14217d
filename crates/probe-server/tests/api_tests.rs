//! Integration tests for the probe API endpoints

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use probe_lib::{
    capture::{FetchParams, FetchTarget, ProfileFetcher},
    health::{components, HealthRegistry},
    models::SampleKind,
    observability::ProbeMetrics,
    render::{RenderTool, Renderer},
    storage::{ArtifactStore, MemoryStore},
    ProfileService,
};
use probe_server::api::{create_router, AppState, CODE_ERROR, CODE_OK};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const TOKEN: &str = "s3cret";

const LISTING: &str = "Samples:
samples/count cpu/nanoseconds
          2   20000000: 1 2
Locations
     1: 0x1 M=1 main.work /src/main.go:3 s=1
     2: 0x2 M=1 main.main /src/main.go:1 s=1
Mappings
";

#[derive(Default)]
struct CountingFetcher {
    calls: AtomicUsize,
}

#[async_trait]
impl ProfileFetcher for CountingFetcher {
    async fn fetch(
        &self,
        _target: &FetchTarget,
        kind: SampleKind,
        _params: &FetchParams,
    ) -> probe_lib::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("raw-{kind}").into_bytes())
    }
}

struct StaticTools;

#[async_trait]
impl RenderTool for StaticTools {
    async fn decode_raw(&self, _raw_path: &Path) -> probe_lib::Result<String> {
        Ok(LISTING.to_string())
    }

    async fn render_flame(&self, _input: &[String]) -> probe_lib::Result<Vec<u8>> {
        Ok(b"<svg>flame</svg>".to_vec())
    }

    async fn render_callgraph(&self, _raw_path: &Path) -> probe_lib::Result<Vec<u8>> {
        Ok(b"<svg>callgraph</svg>".to_vec())
    }
}

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    store: MemoryStore,
    fetcher: Arc<CountingFetcher>,
    _scratch: TempDir,
}

async fn setup_test_app() -> TestApp {
    let scratch = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let fetcher = Arc::new(CountingFetcher::default());
    let renderer = Renderer::new(Arc::new(store.clone()), Arc::new(StaticTools), scratch.path());

    let service = ProfileService::builder()
        .store(Arc::new(store.clone()))
        .fetcher(fetcher.clone())
        .renderer(Arc::new(renderer))
        .root_url("http://probe.test")
        .build()
        .unwrap();

    let health_registry = HealthRegistry::new();
    for name in components::ALL {
        health_registry.register(name).await;
    }

    let state = Arc::new(AppState::new(
        Arc::new(service),
        health_registry,
        ProbeMetrics::new(),
        TOKEN,
    ));
    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        fetcher,
        _scratch: scratch,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, body.to_vec())
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, _, body) = get(router, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

mod capture_tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_by_address_returns_descriptors() {
        let app = setup_test_app().await;

        let (status, body) = get_json(
            &app.router,
            "/api/v1/capture?mode=ip&addr=10.0.0.5:9000&seconds=30&token=s3cret",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], CODE_OK);
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 8);
        assert!(data[0]["url"]
            .as_str()
            .unwrap()
            .starts_with("http://probe.test/api/v1/graph?kind=block&key="));
        assert_eq!(app.fetcher.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_capture_rejects_wrong_token() {
        let app = setup_test_app().await;

        let (status, body) = get_json(
            &app.router,
            "/api/v1/capture?mode=address&addr=10.0.0.5:9000&token=guess",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], CODE_ERROR);
        assert_eq!(body["msg"], "invalid token");
        assert_eq!(app.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_capture_validation_error_is_enveloped() {
        let app = setup_test_app().await;

        let (_, body) = get_json(
            &app.router,
            "/api/v1/capture?mode=pod&clusterName=prod&podName=api-0&token=s3cret",
        )
        .await;

        assert_eq!(body["code"], CODE_ERROR);
        assert!(body["msg"].as_str().unwrap().contains("governance port"));
        assert_eq!(app.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_capture_unknown_cluster_hides_name() {
        let app = setup_test_app().await;

        let (_, body) = get_json(
            &app.router,
            "/api/v1/capture?mode=pod&clusterName=secret-prod&podName=api-0&port=9000&token=s3cret",
        )
        .await;

        assert_eq!(body["code"], CODE_ERROR);
        let msg = body["msg"].as_str().unwrap();
        assert!(msg.contains("target cluster may not exist"));
        assert!(!msg.contains("secret-prod"));
    }

    #[tokio::test]
    async fn test_capture_unknown_mode_is_enveloped() {
        let app = setup_test_app().await;

        let (status, body) =
            get_json(&app.router, "/api/v1/capture?mode=ssh&addr=x&token=s3cret").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], CODE_ERROR);
        assert!(body["msg"].as_str().unwrap().starts_with("invalid parameters"));
    }
}

mod retrieval_tests {
    use super::*;

    #[tokio::test]
    async fn test_graph_serves_svg() {
        let app = setup_test_app().await;
        app.store
            .put_bytes("prod/default/api-0_1700000000000/heap_profile.svg", b"<svg>cg</svg>")
            .await
            .unwrap();

        let (status, content_type, body) = get(
            &app.router,
            "/api/v1/graph?kind=heap&key=prod%2Fdefault%2Fapi-0_1700000000000&render=callgraph",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("image/svg+xml"));
        assert_eq!(body, b"<svg>cg</svg>");
    }

    #[tokio::test]
    async fn test_graph_unknown_render_kind_is_enveloped() {
        let app = setup_test_app().await;

        let (status, body) = get_json(
            &app.router,
            "/api/v1/graph?kind=heap&key=prod%2Fdefault%2Fapi-0_1&render=sunburst",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], CODE_ERROR);
    }

    #[tokio::test]
    async fn test_graph_missing_artifact_is_enveloped() {
        let app = setup_test_app().await;

        let (_, body) = get_json(
            &app.router,
            "/api/v1/graph?kind=heap&key=prod%2Fdefault%2Fapi-0_1&render=flame",
        )
        .await;

        assert_eq!(body["code"], CODE_ERROR);
        assert!(body["msg"].as_str().unwrap().starts_with("graph lookup failed"));
    }

    #[tokio::test]
    async fn test_captures_lists_stored_entries() {
        let app = setup_test_app().await;
        app.store
            .put_bytes("prod/payments/api-0_1700000000000/heap.bin", b"raw")
            .await
            .unwrap();
        app.store
            .put_bytes("prod/payments/worker_1_1700000005000/heap.bin", b"raw")
            .await
            .unwrap();

        let (_, body) = get_json(
            &app.router,
            "/api/v1/captures?clusterName=prod&namespace=payments",
        )
        .await;

        assert_eq!(body["code"], CODE_OK);
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["key"], "prod/payments/api-0_1700000000000");
        assert_eq!(data[0]["subjectName"], "api-0");
        assert_eq!(data[0]["ctime"], 1_700_000_000);
        assert_eq!(data[1]["subjectName"], "worker_1");
    }

    #[tokio::test]
    async fn test_capture_then_fetch_graph() {
        let app = setup_test_app().await;

        let (_, body) = get_json(
            &app.router,
            "/api/v1/capture?mode=address&addr=10.0.0.5:9000&token=s3cret",
        )
        .await;
        let url = body["data"][0]["url"].as_str().unwrap().to_string();
        let path = url.strip_prefix("http://probe.test").unwrap();

        let (status, content_type, svg) = get(&app.router, path).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("image/svg+xml"));
        assert_eq!(svg, b"<svg>flame</svg>");
    }
}

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_healthz_returns_ok_when_healthy() {
        let app = setup_test_app().await;

        let (status, health) = get_json(&app.router, "/healthz").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "healthy");
        assert!(health["components"]["cluster_registry"].is_object());
        assert!(health["components"]["renderer"].is_object());
        assert!(health["components"]["storage"].is_object());
    }

    #[tokio::test]
    async fn test_healthz_returns_ok_when_degraded() {
        let app = setup_test_app().await;
        app.state
            .health_registry
            .set_degraded(components::CLUSTER_REGISTRY, "1 of 2 clusters loaded")
            .await;

        let (status, health) = get_json(&app.router, "/healthz").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "degraded");
    }

    #[tokio::test]
    async fn test_healthz_returns_503_when_unhealthy() {
        let app = setup_test_app().await;
        app.state
            .health_registry
            .set_unhealthy(components::STORAGE, "base path not writable")
            .await;

        let (status, health) = get_json(&app.router, "/healthz").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_readyz_follows_startup() {
        let app = setup_test_app().await;

        let (status, readiness) = get_json(&app.router, "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(readiness["ready"], false);

        app.state.health_registry.set_ready(true).await;
        let (status, readiness) = get_json(&app.router, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(readiness["ready"], true);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_returns_prometheus_format() {
        let app = setup_test_app().await;
        get_json(
            &app.router,
            "/api/v1/capture?mode=address&addr=10.0.0.5:9000&token=s3cret",
        )
        .await;

        let (status, content_type, body) = get(&app.router, "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().contains("text/plain"));
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("profile_probe_capture_requests_total"));
        assert!(text.contains("profile_probe_fetch_latency_seconds_bucket"));
        assert!(text.contains("profile_probe_render_latency_seconds_count"));
    }
}

