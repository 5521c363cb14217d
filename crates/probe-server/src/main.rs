//! Profile probe server
//!
//! Captures runtime profiles from pods across registered clusters, or from
//! plain network addresses, renders them and serves the results.

use anyhow::{Context, Result};
use probe_lib::{
    capture::HttpFetcher,
    health::{components, HealthRegistry},
    observability::{ProbeMetrics, StructuredLogger},
    render::{ExternalTools, Renderer},
    storage::FilesystemStore,
    ClusterRegistry, ProfileService,
};
use probe_server::{api, config::ProbeConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const PROBE_VERSION: &str = env!("CARGO_PKG_VERSION");
const INSTANCE_NAME: &str = "probe-server";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting probe-server");

    let config = ProbeConfig::load().context("failed to load configuration")?;
    info!(
        api_port = config.api_port,
        root_url = %config.root_url,
        clusters = config.clusters.len(),
        "Probe configured"
    );

    let health_registry = HealthRegistry::new();
    for name in components::ALL {
        health_registry.register(name).await;
    }
    let metrics = ProbeMetrics::new();
    let logger = StructuredLogger::new(INSTANCE_NAME);

    // Rendering needs go, dot and a flame graph script; without them no capture can succeed
    let tools = match ExternalTools::discover(config.render.flamegraph_scripts.as_slice()).await {
        Ok(tools) => tools,
        Err(e) => {
            error!(error = %e, "Render environment check failed");
            return Err(e).context("render environment check failed");
        }
    };

    let store = FilesystemStore::open(&config.storage.base_path)
        .await
        .with_context(|| {
            format!(
                "failed to open artifact store at {}",
                config.storage.base_path.display()
            )
        })?;
    let store = Arc::new(store);

    let registry = ClusterRegistry::new();
    let loaded = registry.load(&config.clusters).await;
    metrics.set_clusters_loaded(loaded);
    logger.log_clusters_loaded(loaded, config.clusters.len());
    if loaded < config.clusters.len() {
        health_registry
            .set_degraded(
                components::CLUSTER_REGISTRY,
                format!("{} of {} clusters loaded", loaded, config.clusters.len()),
            )
            .await;
    }

    let renderer = Renderer::new(store.clone(), Arc::new(tools), &config.render.scratch_dir)
        .with_sample_selector(&config.render.sample_index);
    let fetcher = HttpFetcher::new(Duration::from_secs(config.capture.default_timeout_secs))
        .context("failed to create fetcher")?;

    let service = ProfileService::builder()
        .store(store)
        .registry(registry)
        .fetcher(Arc::new(fetcher))
        .renderer(Arc::new(renderer))
        .sample_kinds(config.capture.sample_kinds.iter().copied())
        .root_url(&config.root_url)
        .instance(INSTANCE_NAME)
        .build()
        .context("failed to build profile service")?;

    logger.log_startup(PROBE_VERSION, config.api_port, service.sample_kinds());

    let app_state = Arc::new(api::AppState::new(
        Arc::new(service),
        health_registry.clone(),
        metrics.clone(),
        config.token.clone(),
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => info!("API server stopped"),
                Ok(Err(e)) => return Err(e).context("API server failed"),
                Err(e) => return Err(e).context("API server task panicked"),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
