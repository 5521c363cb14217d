//! Rendering raw sample dumps into flame graphs and call graphs
//!
//! For every captured sample kind the renderer stores three artifacts
//! under the request key:
//! - `<kind>.bin`: the raw dump as fetched
//! - `<kind>_flame.svg`: flame graph of the selected sample type
//! - `<kind>_profile.svg`: call graph drawn by pprof

mod raw;
mod tools;

pub use raw::{RawProfile, RawSample};
pub use tools::{find_executable, ExternalTools, RenderTool, DEFAULT_FLAMEGRAPH_SCRIPTS};

use crate::capture::RequestKey;
use crate::error::{ProbeError, RenderStage, Result};
use crate::models::{RenderKind, SampleKind};
use crate::observability::ProbeMetrics;
use crate::storage::ArtifactStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Turns raw dumps into stored images
pub struct Renderer {
    store: Arc<dyn ArtifactStore>,
    tools: Arc<dyn RenderTool>,
    scratch_dir: PathBuf,
    sample_selector: String,
    metrics: ProbeMetrics,
}

impl Renderer {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        tools: Arc<dyn RenderTool>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            tools,
            scratch_dir: scratch_dir.into(),
            sample_selector: String::new(),
            metrics: ProbeMetrics::new(),
        }
    }

    /// Sample type to draw flame graphs from; empty means the first one
    pub fn with_sample_selector(mut self, selector: impl Into<String>) -> Self {
        self.sample_selector = selector.into();
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Persist a raw dump and both of its images under `key`
    pub async fn render(&self, raw: &[u8], key: &RequestKey, kind: SampleKind) -> Result<()> {
        let started = Instant::now();

        let scratch = self.scratch_dir.join(key.as_str());
        tokio::fs::create_dir_all(&scratch)
            .await
            .map_err(|e| ProbeError::render(RenderStage::Scratch, e))?;
        let raw_path = scratch.join(format!("{kind}.bin"));
        tokio::fs::write(&raw_path, raw)
            .await
            .map_err(|e| ProbeError::render(RenderStage::Scratch, e))?;

        self.store
            .put_bytes(&key.raw_artifact(kind), raw)
            .await?;

        let flame = self.flame_graph(&raw_path).await?;
        self.store
            .put_bytes(&key.image_artifact(kind, RenderKind::Flame), &flame)
            .await?;

        let callgraph = self.tools.render_callgraph(&raw_path).await?;
        self.store
            .put_bytes(&key.image_artifact(kind, RenderKind::Callgraph), &callgraph)
            .await?;

        self.metrics
            .observe_render_latency(kind, started.elapsed().as_secs_f64());
        debug!(
            key = %key,
            kind = %kind,
            raw_bytes = raw.len(),
            flame_bytes = flame.len(),
            callgraph_bytes = callgraph.len(),
            "Rendered profile"
        );
        Ok(())
    }

    /// Decode a raw dump and build its flame-graph input lines
    pub async fn flame_input(&self, raw_path: &Path) -> Result<Vec<String>> {
        let listing = self.tools.decode_raw(raw_path).await?;
        let profile = RawProfile::parse(&listing)?;
        let index = profile.select_sample(&self.sample_selector);
        profile.flame_input(index)
    }

    async fn flame_graph(&self, raw_path: &Path) -> Result<Vec<u8>> {
        let input = self.flame_input(raw_path).await?;
        if input.is_empty() {
            debug!(path = %raw_path.display(), "Profile has no samples, storing empty flame graph");
            return Ok(Vec::new());
        }
        self.tools.render_flame(&input).await
    }

    /// Remove the scratch directory of a finished request
    pub async fn cleanup(&self, key: &RequestKey) {
        let scratch = self.scratch_dir.join(key.as_str());
        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %scratch.display(), error = %e, "Failed to remove scratch directory");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const LISTING: &str = "Samples:\nsamples/count cpu/nanoseconds\n 3 30: 1 2\nLocations\n     1: 0x1 M=1 main.work /a.go:3 s=1\n     2: 0x2 M=1 main.main /a.go:1 s=1\nMappings\n";

    struct FakeTools {
        listing: String,
        flame_calls: AtomicUsize,
    }

    #[async_trait]
    impl RenderTool for FakeTools {
        async fn decode_raw(&self, raw_path: &Path) -> Result<String> {
            assert!(raw_path.exists());
            Ok(self.listing.clone())
        }

        async fn render_flame(&self, input: &[String]) -> Result<Vec<u8>> {
            self.flame_calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("<svg>{}</svg>", input.join("|")).into_bytes())
        }

        async fn render_callgraph(&self, _raw_path: &Path) -> Result<Vec<u8>> {
            Ok(b"<svg>callgraph</svg>".to_vec())
        }
    }

    fn renderer(listing: &str) -> (TempDir, MemoryStore, Arc<FakeTools>, Renderer) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let tools = Arc::new(FakeTools {
            listing: listing.to_string(),
            flame_calls: AtomicUsize::new(0),
        });
        let renderer = Renderer::new(Arc::new(store.clone()), tools.clone(), dir.path());
        (dir, store, tools, renderer)
    }

    #[tokio::test]
    async fn test_render_writes_three_artifacts() {
        let (_dir, store, _tools, renderer) = renderer(LISTING);
        let key = RequestKey::from_string("prod/default/api-0_1700000000000");

        renderer.render(b"raw-dump", &key, SampleKind::Profile).await.unwrap();

        assert_eq!(
            store.keys().await,
            vec![
                "prod/default/api-0_1700000000000/profile.bin".to_string(),
                "prod/default/api-0_1700000000000/profile_flame.svg".to_string(),
                "prod/default/api-0_1700000000000/profile_profile.svg".to_string(),
            ]
        );
        let flame = store
            .get_bytes("prod/default/api-0_1700000000000/profile_flame.svg")
            .await
            .unwrap();
        assert_eq!(flame, b"<svg>main.main;main.work 3</svg>");
    }

    #[tokio::test]
    async fn test_empty_profile_stores_empty_flame_graph() {
        let (_dir, store, tools, renderer) =
            renderer("Samples:\nsamples/count\nLocations\nMappings\n");
        let key = RequestKey::from_string("prod/default/idle_1");

        renderer.render(b"raw", &key, SampleKind::Block).await.unwrap();

        let flame = store.get_bytes("prod/default/idle_1/block_flame.svg").await.unwrap();
        assert!(flame.is_empty());
        assert_eq!(tools.flame_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cleanup_removes_scratch() {
        let (_dir, _store, _tools, renderer) = renderer(LISTING);
        let key = RequestKey::from_string("prod/default/api-0_2");
        renderer.render(b"raw", &key, SampleKind::Heap).await.unwrap();

        let scratch = renderer.scratch_dir().join(key.as_str());
        assert!(scratch.exists());
        renderer.cleanup(&key).await;
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn test_same_dump_gives_same_flame_input() {
        let (dir, _store, _tools, renderer) = renderer(LISTING);
        let path = dir.path().join("heap.bin");
        std::fs::write(&path, b"raw").unwrap();

        let first = renderer.flame_input(&path).await.unwrap();
        let second = renderer.flame_input(&path).await.unwrap();
        assert_eq!(first, second);
    }
}
