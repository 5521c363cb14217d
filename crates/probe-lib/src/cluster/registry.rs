//! Concurrent name → cluster manager map

use super::client::{build_client, ClientBuildError, ClientBuildOptions, ConnectionLimits};
use crate::error::{ProbeError, Result};
use crate::models::ClusterDescriptor;
use dashmap::DashMap;
use kube::{Client, Config};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A built client together with the descriptor it came from
pub struct ClusterManager {
    pub cluster: ClusterDescriptor,
    pub client: Client,
    pub config: Config,
    pub limits: ConnectionLimits,
}

impl ClusterManager {
    /// Build a manager for one descriptor
    pub async fn build(cluster: ClusterDescriptor) -> Result<Self, ClientBuildError> {
        let mut options = ClientBuildOptions::default();
        if let Some(proxy) = cluster.proxy() {
            options = options.with_proxy(proxy);
        }

        let (client, config) =
            build_client(&cluster.api_server, &cluster.kube_config, &options).await?;

        Ok(Self {
            cluster,
            client,
            config,
            limits: options.limits,
        })
    }

    pub fn name(&self) -> &str {
        &self.cluster.name
    }
}

impl fmt::Debug for ClusterManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterManager")
            .field("name", &self.cluster.name)
            .field("api_server", &self.cluster.api_server)
            .field("proxy", &self.config.proxy_url)
            .field("limits", &self.limits)
            .finish()
    }
}

/// Registry of cluster managers keyed by cluster name
///
/// Written at startup, read concurrently while serving captures.
#[derive(Clone, Default)]
pub struct ClusterRegistry {
    managers: Arc<DashMap<String, Arc<ClusterManager>>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register a manager for every usable descriptor
    ///
    /// Descriptors without an endpoint, or whose client cannot be built,
    /// are skipped with a warning. Managers become visible one at a time.
    /// Returns the number of managers registered by this call.
    pub async fn load(&self, descriptors: &[ClusterDescriptor]) -> usize {
        let mut loaded = 0;

        for descriptor in descriptors {
            if descriptor.api_server.trim().is_empty() {
                warn!(cluster = %descriptor.name, "Cluster has no API server address, skipping");
                continue;
            }

            match ClusterManager::build(descriptor.clone()).await {
                Ok(manager) => {
                    debug!(
                        cluster = %descriptor.name,
                        api_server = %descriptor.api_server,
                        proxied = descriptor.proxy().is_some(),
                        "Built cluster client"
                    );
                    self.insert(manager);
                    loaded += 1;
                }
                Err(e) => {
                    warn!(
                        cluster = %descriptor.name,
                        error = %e,
                        "Failed to build cluster client, skipping"
                    );
                }
            }
        }

        info!(
            loaded = loaded,
            declared = descriptors.len(),
            "Cluster registry loaded"
        );
        loaded
    }

    /// Insert or replace a manager under its cluster name
    pub fn insert(&self, manager: ClusterManager) {
        self.managers
            .insert(manager.cluster.name.clone(), Arc::new(manager));
    }

    /// Look up a manager by cluster name
    pub fn get(&self, name: &str) -> Result<Arc<ClusterManager>> {
        self.managers
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ProbeError::ClusterNotFound {
                name: name.to_string(),
            })
    }

    /// Names of all registered clusters, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.managers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::testing::TEST_KUBECONFIG;

    fn descriptor(name: &str, api_server: &str, kube_config: &str) -> ClusterDescriptor {
        ClusterDescriptor {
            name: name.to_string(),
            description: format!("{name} cluster"),
            api_server: api_server.to_string(),
            kube_config: kube_config.to_string(),
            proxy: None,
        }
    }

    #[tokio::test]
    async fn test_load_skips_missing_endpoint_and_bad_bundle() {
        let registry = ClusterRegistry::new();
        let loaded = registry
            .load(&[
                descriptor("no-endpoint", "", TEST_KUBECONFIG),
                descriptor("bad-bundle", "https://10.0.0.1:6443", "{not: [valid"),
                descriptor("prod", "https://10.0.0.2:6443", TEST_KUBECONFIG),
            ])
            .await;

        assert_eq!(loaded, 1);
        assert_eq!(registry.names(), vec!["prod".to_string()]);
        assert!(registry.get("no-endpoint").is_err());
        assert!(registry.get("bad-bundle").is_err());
    }

    #[tokio::test]
    async fn test_get_returns_registered_manager() {
        let registry = ClusterRegistry::new();
        registry
            .load(&[descriptor("staging", "https://10.0.0.3:6443", TEST_KUBECONFIG)])
            .await;

        let manager = registry.get("staging").unwrap();
        assert_eq!(manager.name(), "staging");
        assert_eq!(manager.config.cluster_url.host(), Some("10.0.0.3"));
        assert_eq!(manager.limits, ConnectionLimits::default());
    }

    #[tokio::test]
    async fn test_reload_replaces_manager() {
        let registry = ClusterRegistry::new();
        registry
            .load(&[descriptor("prod", "https://10.0.0.2:6443", TEST_KUBECONFIG)])
            .await;
        registry
            .load(&[descriptor("prod", "https://10.0.0.9:6443", TEST_KUBECONFIG)])
            .await;

        assert_eq!(registry.len(), 1);
        let manager = registry.get("prod").unwrap();
        assert_eq!(manager.config.cluster_url.host(), Some("10.0.0.9"));
    }

    #[test]
    fn test_unknown_cluster() {
        let registry = ClusterRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.get("missing"),
            Err(ProbeError::ClusterNotFound { .. })
        ));
    }
}
