//! Capture orchestration: one request fans out into one task per sample kind

use super::fetch::{capture_params, FetchParams, FetchTarget, ProfileFetcher};
use super::key::{parse_listing_entry, RequestKey};
use crate::cluster::ClusterRegistry;
use crate::error::{ProbeError, Result};
use crate::models::{
    ArtifactDescriptor, CaptureRequest, CaptureTarget, GraphQuery, RenderKind, SampleKind,
    StoredArtifactEntry, DEFAULT_NAMESPACE,
};
use crate::observability::{ProbeMetrics, StructuredLogger};
use crate::render::Renderer;
use crate::storage::ArtifactStore;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use url::Url;

/// Route serving stored images, relative to the root URL
const GRAPH_ROUTE: &str = "api/v1/graph";

/// Entry point for capturing, retrieving and listing profiles
pub struct ProfileService {
    store: Arc<dyn ArtifactStore>,
    registry: ClusterRegistry,
    fetcher: Arc<dyn ProfileFetcher>,
    renderer: Arc<Renderer>,
    sample_kinds: Vec<SampleKind>,
    graph_endpoint: Url,
    metrics: ProbeMetrics,
    logger: StructuredLogger,
}

impl ProfileService {
    pub fn builder() -> ProfileServiceBuilder {
        ProfileServiceBuilder::new()
    }

    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    pub fn sample_kinds(&self) -> &[SampleKind] {
        &self.sample_kinds
    }

    /// Capture every configured sample kind from the request's target
    ///
    /// Validation and cluster lookup fail before any fetch is issued. Once
    /// the fan-out starts every kind runs to completion; the first failure
    /// observed is returned, and artifacts written by the other kinds stay
    /// in the store.
    pub async fn generate_capture(
        &self,
        request: &CaptureRequest,
    ) -> Result<Vec<ArtifactDescriptor>> {
        let started = Instant::now();
        self.metrics.inc_capture_requests(request.mode);

        let target = request.validate().map_err(|e| self.failed(None, e))?;
        let key = RequestKey::for_target(&target, chrono::Utc::now().timestamp_millis());
        let fetch_target = self
            .resolve_target(&target)
            .map_err(|e| self.failed(Some(&key), e))?;

        let fetch_target = Arc::new(fetch_target);
        let mut tasks = JoinSet::new();
        for &kind in &self.sample_kinds {
            let fetcher = Arc::clone(&self.fetcher);
            let renderer = Arc::clone(&self.renderer);
            let target = Arc::clone(&fetch_target);
            let key = key.clone();
            let metrics = self.metrics.clone();
            let params = capture_params(kind, request.seconds);
            let descriptors = self.descriptors(&key, kind);

            tasks.spawn(async move {
                let result = capture_kind(
                    fetcher.as_ref(),
                    &renderer,
                    &metrics,
                    &target,
                    &key,
                    kind,
                    &params,
                )
                .await
                .map(|()| descriptors);
                (kind, result)
            });
        }

        let mut descriptors = Vec::with_capacity(self.sample_kinds.len() * RenderKind::ALL.len());
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(produced))) => descriptors.extend(produced),
                Ok((kind, Err(e))) => {
                    warn!(key = %key, kind = %kind, error = %e, "Sample capture failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Sample capture task did not complete");
                    first_error.get_or_insert(ProbeError::Task(e.to_string()));
                }
            }
        }
        self.renderer.cleanup(&key).await;

        if let Some(e) = first_error {
            return Err(self.failed(Some(&key), e));
        }

        descriptors.sort_by_key(|d| (d.sample_kind, d.render_kind == RenderKind::Callgraph));
        self.logger.log_capture_completed(
            key.as_str(),
            descriptors.len(),
            started.elapsed().as_millis() as u64,
        );
        Ok(descriptors)
    }

    /// Read one stored image
    pub async fn find_graph(&self, query: &GraphQuery) -> Result<Vec<u8>> {
        let key = query.key.trim().trim_matches('/');
        if key.is_empty() {
            return Err(ProbeError::Validation("key cannot be empty".to_string()));
        }
        let key = RequestKey::from_string(key);
        self.store
            .get_bytes(&key.image_artifact(query.kind, query.render))
            .await
    }

    /// Captures stored under `<cluster>/<namespace>`, in listing order
    ///
    /// Children whose names do not end in `_<millis>` are skipped.
    pub async fn list_captures(
        &self,
        cluster_name: &str,
        namespace: &str,
    ) -> Result<Vec<StoredArtifactEntry>> {
        let cluster_name = cluster_name.trim();
        if cluster_name.is_empty() {
            return Err(ProbeError::Validation(
                "cluster name cannot be empty".to_string(),
            ));
        }
        let namespace = match namespace.trim() {
            "" => DEFAULT_NAMESPACE,
            ns => ns,
        };

        let prefix = format!("{cluster_name}/{namespace}");
        let names = self.store.list(&prefix).await?;
        let entries: Vec<StoredArtifactEntry> = names
            .iter()
            .filter_map(|name| {
                let entry = parse_listing_entry(&prefix, name);
                if entry.is_none() {
                    debug!(prefix = %prefix, name = %name, "Skipping unrecognized listing entry");
                }
                entry
            })
            .collect();
        Ok(entries)
    }

    /// Retrieval URL of one stored image
    pub fn graph_url(&self, key: &RequestKey, kind: SampleKind, render: RenderKind) -> String {
        let mut url = self.graph_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("kind", kind.as_str())
            .append_pair("key", key.as_str())
            .append_pair("render", render.as_str());
        url.into()
    }

    fn descriptors(&self, key: &RequestKey, kind: SampleKind) -> Vec<ArtifactDescriptor> {
        RenderKind::ALL
            .iter()
            .map(|&render| ArtifactDescriptor {
                sample_kind: kind,
                render_kind: render,
                url: self.graph_url(key, kind, render),
            })
            .collect()
    }

    fn resolve_target(&self, target: &CaptureTarget) -> Result<FetchTarget> {
        match target {
            CaptureTarget::Pod {
                cluster_name,
                namespace,
                pod_name,
                port,
            } => {
                let manager = self.registry.get(cluster_name).map_err(|e| {
                    warn!(
                        cluster = %cluster_name,
                        registered = ?self.registry.names(),
                        "Capture requested for an unregistered cluster"
                    );
                    e
                })?;
                Ok(FetchTarget::Pod {
                    manager,
                    namespace: namespace.clone(),
                    pod_name: pod_name.clone(),
                    port: *port,
                })
            }
            CaptureTarget::Address { addr, .. } => Ok(FetchTarget::Address { addr: addr.clone() }),
        }
    }

    fn failed(&self, key: Option<&RequestKey>, error: ProbeError) -> ProbeError {
        self.metrics.inc_capture_failures(error.reason());
        self.logger
            .log_capture_failed(key.map(RequestKey::as_str), error.reason(), &error.to_string());
        error
    }
}

async fn capture_kind(
    fetcher: &dyn ProfileFetcher,
    renderer: &Renderer,
    metrics: &ProbeMetrics,
    target: &FetchTarget,
    key: &RequestKey,
    kind: SampleKind,
    params: &FetchParams,
) -> Result<()> {
    let started = Instant::now();
    let raw = fetcher.fetch(target, kind, params).await;
    metrics.observe_fetch_latency(kind, started.elapsed().as_secs_f64());
    let raw = raw?;

    debug!(key = %key, kind = %kind, bytes = raw.len(), "Fetched profile");
    renderer.render(&raw, key, kind).await
}

/// Builder for `ProfileService`
pub struct ProfileServiceBuilder {
    store: Option<Arc<dyn ArtifactStore>>,
    registry: ClusterRegistry,
    fetcher: Option<Arc<dyn ProfileFetcher>>,
    renderer: Option<Arc<Renderer>>,
    sample_kinds: Vec<SampleKind>,
    root_url: String,
    instance: String,
}

impl ProfileServiceBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            registry: ClusterRegistry::new(),
            fetcher: None,
            renderer: None,
            sample_kinds: SampleKind::DEFAULT_SET.to_vec(),
            root_url: "http://localhost:8080".to_string(),
            instance: "probe-server".to_string(),
        }
    }

    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(mut self, registry: ClusterRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn ProfileFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn renderer(mut self, renderer: Arc<Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn sample_kinds(mut self, kinds: impl IntoIterator<Item = SampleKind>) -> Self {
        self.sample_kinds = kinds.into_iter().collect();
        self
    }

    /// Externally reachable root used to build retrieval URLs
    pub fn root_url(mut self, root_url: impl Into<String>) -> Self {
        self.root_url = root_url.into();
        self
    }

    /// Name reported in structured log events
    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    pub fn build(self) -> Result<ProfileService> {
        let store = self
            .store
            .ok_or_else(|| ProbeError::Config("artifact store is required".to_string()))?;
        let fetcher = self
            .fetcher
            .ok_or_else(|| ProbeError::Config("profile fetcher is required".to_string()))?;
        let renderer = self
            .renderer
            .ok_or_else(|| ProbeError::Config("renderer is required".to_string()))?;

        let mut sample_kinds = self.sample_kinds;
        sample_kinds.sort();
        sample_kinds.dedup();
        if sample_kinds.is_empty() {
            return Err(ProbeError::Config(
                "at least one sample kind must be captured".to_string(),
            ));
        }

        Ok(ProfileService {
            store,
            registry: self.registry,
            fetcher,
            renderer,
            sample_kinds,
            graph_endpoint: graph_endpoint(&self.root_url)?,
            metrics: ProbeMetrics::new(),
            logger: StructuredLogger::new(self.instance),
        })
    }
}

impl Default for ProfileServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn graph_endpoint(root_url: &str) -> Result<Url> {
    let mut root = Url::parse(root_url.trim())
        .map_err(|e| ProbeError::Config(format!("invalid root_url {root_url:?}: {e}")))?;
    if !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }
    root.join(GRAPH_ROUTE)
        .map_err(|e| ProbeError::Config(format!("invalid root_url {root_url:?}: {e}")))
}
