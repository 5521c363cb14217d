//! Observability infrastructure for the profile probe
//!
//! Provides:
//! - Prometheus metrics (capture requests and failures, fetch and render latency, cluster count)
//! - Structured JSON logging with tracing

use crate::models::{CaptureMode, RenderKind, SampleKind};
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Fetch latency buckets (in seconds); CPU captures run for their whole duration
const FETCH_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Render latency buckets (in seconds)
const RENDER_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Artifacts stored by one completed render: the raw dump plus one image per render kind
pub const ARTIFACTS_PER_RENDER: u64 = RenderKind::ALL.len() as u64 + 1;

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ProbeMetricsInner> = OnceLock::new();

struct ProbeMetricsInner {
    capture_requests: IntCounterVec,
    capture_failures: IntCounterVec,
    fetch_latency_seconds: HistogramVec,
    render_latency_seconds: HistogramVec,
    artifacts_written: IntCounter,
    clusters_loaded: IntGauge,
}

impl ProbeMetricsInner {
    fn new() -> Self {
        Self {
            capture_requests: register_int_counter_vec!(
                "profile_probe_capture_requests_total",
                "Capture requests received, by transport mode",
                &["mode"]
            )
            .expect("Failed to register capture_requests_total"),

            capture_failures: register_int_counter_vec!(
                "profile_probe_capture_failures_total",
                "Capture requests that failed, by error kind",
                &["reason"]
            )
            .expect("Failed to register capture_failures_total"),

            fetch_latency_seconds: register_histogram_vec!(
                "profile_probe_fetch_latency_seconds",
                "Time spent fetching a raw profile from its target",
                &["kind"],
                FETCH_BUCKETS.to_vec()
            )
            .expect("Failed to register fetch_latency_seconds"),

            render_latency_seconds: register_histogram_vec!(
                "profile_probe_render_latency_seconds",
                "Time spent rendering and storing one sample kind",
                &["kind"],
                RENDER_BUCKETS.to_vec()
            )
            .expect("Failed to register render_latency_seconds"),

            artifacts_written: register_int_counter!(
                "profile_probe_artifacts_written_total",
                "Artifacts (raw dumps and images) persisted to the artifact store"
            )
            .expect("Failed to register artifacts_written_total"),

            clusters_loaded: register_int_gauge!(
                "profile_probe_clusters_loaded",
                "Number of clusters with a usable API client"
            )
            .expect("Failed to register clusters_loaded"),
        }
    }
}

/// Probe metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ProbeMetrics {
    _private: (),
}

impl Default for ProbeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ProbeMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ProbeMetricsInner {
        GLOBAL_METRICS.get_or_init(ProbeMetricsInner::new)
    }

    pub fn inc_capture_requests(&self, mode: CaptureMode) {
        let label = match mode {
            CaptureMode::Pod => "pod",
            CaptureMode::Address => "address",
        };
        self.inner().capture_requests.with_label_values(&[label]).inc();
    }

    /// Count a failed capture under its error kind, see `ProbeError::reason`
    pub fn inc_capture_failures(&self, reason: &str) {
        self.inner()
            .capture_failures
            .with_label_values(&[reason])
            .inc();
    }

    pub fn observe_fetch_latency(&self, kind: SampleKind, duration_secs: f64) {
        self.inner()
            .fetch_latency_seconds
            .with_label_values(&[kind.as_str()])
            .observe(duration_secs);
    }

    /// Record one completed render and the artifacts it stored
    pub fn observe_render_latency(&self, kind: SampleKind, duration_secs: f64) {
        self.inner()
            .render_latency_seconds
            .with_label_values(&[kind.as_str()])
            .observe(duration_secs);
        self.inner().artifacts_written.inc_by(ARTIFACTS_PER_RENDER);
    }

    pub fn set_clusters_loaded(&self, count: usize) {
        self.inner().clusters_loaded.set(count as i64);
    }
}

/// Structured logger for probe lifecycle and capture events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log server startup
    pub fn log_startup(&self, version: &str, api_port: u16, sample_kinds: &[SampleKind]) {
        let kinds: Vec<&str> = sample_kinds.iter().map(SampleKind::as_str).collect();
        info!(
            event = "probe_started",
            instance = %self.instance,
            version = %version,
            api_port = api_port,
            sample_kinds = ?kinds,
            "Profile probe started"
        );
    }

    /// Log the outcome of loading the declared clusters
    pub fn log_clusters_loaded(&self, loaded: usize, declared: usize) {
        if loaded < declared {
            warn!(
                event = "clusters_loaded",
                instance = %self.instance,
                loaded = loaded,
                declared = declared,
                "Some declared clusters are unavailable"
            );
        } else {
            info!(
                event = "clusters_loaded",
                instance = %self.instance,
                loaded = loaded,
                declared = declared,
                "All declared clusters loaded"
            );
        }
    }

    pub fn log_capture_completed(&self, key: &str, artifacts: usize, duration_ms: u64) {
        info!(
            event = "capture_completed",
            instance = %self.instance,
            key = %key,
            artifacts = artifacts,
            duration_ms = duration_ms,
            "Capture completed"
        );
    }

    /// Log a failed capture; `key` is absent when validation failed
    pub fn log_capture_failed(&self, key: Option<&str>, reason: &str, error: &str) {
        warn!(
            event = "capture_failed",
            instance = %self.instance,
            key = key.unwrap_or(""),
            reason = %reason,
            error = %error,
            "Capture failed"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "probe_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Profile probe shutting down"
        );
    }
}
