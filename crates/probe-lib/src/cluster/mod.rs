//! Registry of authenticated API clients for remote clusters
//!
//! Each cluster declared in configuration gets one `kube::Client`, built
//! from its kubeconfig bundle with the declared endpoint and optional
//! outbound proxy. Clients are held for the lifetime of the process and
//! looked up by cluster name when a pod-mode capture is requested.

mod client;
mod registry;

pub use client::{
    build_client, load_kubeconfig, ClientBuildError, ClientBuildOptions, ConnectionLimits,
    DEFAULT_BURST, DEFAULT_QPS,
};
pub use registry::{ClusterManager, ClusterRegistry};

#[cfg(test)]
pub(crate) mod testing {
    /// Minimal kubeconfig accepted by `build_client` without network access
    pub const TEST_KUBECONFIG: &str = r#"apiVersion: v1
kind: Config
clusters:
- name: test
  cluster:
    server: https://127.0.0.1:6443
    insecure-skip-tls-verify: true
users:
- name: test
  user:
    token: test-token
contexts:
- name: test
  context:
    cluster: test
    user: test
current-context: test
"#;
}
