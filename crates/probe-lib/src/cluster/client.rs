//! Building a `kube::Client` from a cluster descriptor

use kube::config::{KubeConfigOptions, Kubeconfig, KubeconfigError};
use kube::{Client, Config};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// QPS ceiling applied to every cluster client, far above any real usage
pub const DEFAULT_QPS: f32 = 1e6;

/// Burst ceiling applied to every cluster client
pub const DEFAULT_BURST: u32 = 1_000_000;

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("credential bundle is empty")]
    EmptyBundle,

    #[error("invalid credential bundle: {0}")]
    Kubeconfig(#[from] KubeconfigError),

    #[error("invalid address {address}: {source}")]
    InvalidUri {
        address: String,
        #[source]
        source: http::uri::InvalidUri,
    },

    #[error("failed to construct client: {0}")]
    Client(#[from] kube::Error),
}

/// Client-side request limits recorded for a cluster connection
///
/// kube-rs applies no client-side rate limiting, so these are carried as
/// resolved configuration rather than enforced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionLimits {
    pub qps: f32,
    pub burst: u32,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            qps: DEFAULT_QPS,
            burst: DEFAULT_BURST,
        }
    }
}

/// Options applied on top of the kubeconfig when building a client
#[derive(Debug, Clone, Default)]
pub struct ClientBuildOptions {
    pub proxy: Option<String>,
    pub limits: ConnectionLimits,
}

impl ClientBuildOptions {
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }
}

/// Parse a kubeconfig bundle that is either inline YAML/JSON or a file path
pub fn load_kubeconfig(bundle: &str) -> Result<Kubeconfig, ClientBuildError> {
    let bundle = bundle.trim();
    if bundle.is_empty() {
        return Err(ClientBuildError::EmptyBundle);
    }

    let inline = bundle.starts_with('{') || bundle.contains('\n') || bundle.contains(": ");
    if inline {
        Ok(Kubeconfig::from_yaml(bundle)?)
    } else {
        debug!(path = %bundle, "Reading kubeconfig from file");
        Ok(Kubeconfig::read_from(Path::new(bundle))?)
    }
}

/// Build a client for `api_server` authenticated with the given bundle
///
/// The declared endpoint replaces whatever server the kubeconfig names.
pub async fn build_client(
    api_server: &str,
    bundle: &str,
    options: &ClientBuildOptions,
) -> Result<(Client, Config), ClientBuildError> {
    let kubeconfig = load_kubeconfig(bundle)?;
    let mut config =
        Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;

    apply_overrides(&mut config, api_server, options)?;

    let client = Client::try_from(config.clone())?;
    Ok((client, config))
}

/// Point `config` at the declared endpoint and route it through the proxy
pub(crate) fn apply_overrides(
    config: &mut Config,
    api_server: &str,
    options: &ClientBuildOptions,
) -> Result<(), ClientBuildError> {
    config.cluster_url = parse_uri(api_server)?;

    if let Some(proxy) = options.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
        config.proxy_url = Some(parse_uri(proxy)?);
    }
    Ok(())
}

fn parse_uri(address: &str) -> Result<http::Uri, ClientBuildError> {
    address
        .trim()
        .parse::<http::Uri>()
        .map_err(|source| ClientBuildError::InvalidUri {
            address: address.to_string(),
            source,
        })
}
