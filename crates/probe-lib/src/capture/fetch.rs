//! Fetching raw sample dumps from diagnostic endpoints
//!
//! Two transports are supported:
//! - pod mode: through the cluster API server's pod `proxy` subresource,
//!   authenticated with the cluster's client
//! - address mode: a direct HTTP GET with a local timeout

use crate::cluster::ClusterManager;
use crate::error::{ProbeError, Result};
use crate::models::SampleKind;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::Resource;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Query parameters passed to a diagnostic endpoint
pub type FetchParams = BTreeMap<String, String>;

/// Timeout for address-mode fetches without a capture duration
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Slack added on top of a capture duration
const DURATION_GRACE_SECS: u64 = 5;

/// Longest error body kept in a transport error message
const MAX_ERROR_BODY: usize = 512;

/// Where a sample dump is fetched from
#[derive(Debug, Clone)]
pub enum FetchTarget {
    Pod {
        manager: Arc<ClusterManager>,
        namespace: String,
        pod_name: String,
        port: u16,
    },
    Address {
        addr: String,
    },
}

/// Source of raw sample dumps
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch(
        &self,
        target: &FetchTarget,
        kind: SampleKind,
        params: &FetchParams,
    ) -> Result<Vec<u8>>;
}

/// Parameters sent for `kind`: CPU-style kinds carry the capture duration
pub fn capture_params(kind: SampleKind, seconds: u32) -> FetchParams {
    let mut params = FetchParams::new();
    if kind.takes_duration() {
        params.insert("seconds".to_string(), seconds.to_string());
    }
    params
}

/// Timeout for an address-mode fetch: `default`, or the capture duration plus grace
pub fn fetch_timeout(default: Duration, params: &FetchParams) -> Duration {
    match params.get("seconds").and_then(|s| s.parse::<u64>().ok()) {
        Some(seconds) if seconds > 0 => Duration::from_secs(seconds + DURATION_GRACE_SECS),
        _ => default,
    }
}

/// Direct URL of a diagnostic endpoint, without query
pub fn address_url(addr: &str, kind: SampleKind) -> String {
    let base = addr.trim().trim_end_matches('/');
    let base = if base.starts_with("http://") || base.starts_with("https://") {
        base.to_string()
    } else {
        format!("http://{base}")
    };
    format!("{base}/{}", kind.diagnostic_path())
}

/// API server path of a pod-proxied diagnostic endpoint, with query
pub fn pod_proxy_path(
    namespace: &str,
    pod_name: &str,
    port: u16,
    kind: SampleKind,
    params: &FetchParams,
) -> String {
    let pods = Pod::url_path(&(), Some(namespace));
    let mut path = format!(
        "{pods}/{pod_name}:{port}/proxy/{}",
        kind.diagnostic_path()
    );
    if !params.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();
        path.push('?');
        path.push_str(&query);
    }
    path
}

/// `ProfileFetcher` using the cluster clients and a shared HTTP client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
    default_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(default_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ProbeError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            default_timeout,
        })
    }

    async fn fetch_via_cluster(
        &self,
        manager: &ClusterManager,
        namespace: &str,
        pod_name: &str,
        port: u16,
        kind: SampleKind,
        params: &FetchParams,
    ) -> Result<Vec<u8>> {
        let path = pod_proxy_path(namespace, pod_name, port, kind, params);
        debug!(cluster = %manager.name(), path = %path, kind = %kind, "Fetching profile through cluster proxy");

        let transport_error = |status: Option<u16>, message: String| ProbeError::Transport {
            url: format!("{}{}", manager.config.cluster_url, path.trim_start_matches('/')),
            kind,
            status,
            message,
        };

        let request = http::Request::get(path.as_str())
            .body(hyper::Body::empty())
            .map_err(|e| transport_error(None, e.to_string()))?;

        let response = manager
            .client
            .send(request)
            .await
            .map_err(|e| transport_error(None, e.to_string()))?;

        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| transport_error(Some(status.as_u16()), e.to_string()))?;

        if !status.is_success() {
            return Err(transport_error(
                Some(status.as_u16()),
                format!("status code {}: {}", status.as_u16(), truncate_body(&body)),
            ));
        }
        Ok(body.to_vec())
    }

    async fn fetch_via_address(
        &self,
        addr: &str,
        kind: SampleKind,
        params: &FetchParams,
    ) -> Result<Vec<u8>> {
        let url = address_url(addr, kind);
        let timeout = fetch_timeout(self.default_timeout, params);
        debug!(url = %url, kind = %kind, timeout_secs = timeout.as_secs(), "Fetching profile from address");

        let transport_error = |status: Option<u16>, message: String| ProbeError::Transport {
            url: url.clone(),
            kind,
            status,
            message,
        };

        let response = self
            .http
            .get(&url)
            .query(params)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(transport_error(
                Some(status.as_u16()),
                format!("status code {}: {}", status.as_u16(), truncate_body(&body)),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(Some(status.as_u16()), e.to_string()))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl ProfileFetcher for HttpFetcher {
    async fn fetch(
        &self,
        target: &FetchTarget,
        kind: SampleKind,
        params: &FetchParams,
    ) -> Result<Vec<u8>> {
        match target {
            FetchTarget::Pod {
                manager,
                namespace,
                pod_name,
                port,
            } => {
                self.fetch_via_cluster(manager, namespace, pod_name, *port, kind, params)
                    .await
            }
            FetchTarget::Address { addr } => self.fetch_via_address(addr, kind, params).await,
        }
    }
}

fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
