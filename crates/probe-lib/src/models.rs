//! Core data models for capture requests, clusters and stored artifacts

use crate::error::{ProbeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Namespace segment used in request keys for address-mode captures
pub const ADDRESS_NAMESPACE: &str = "custom";

/// Namespace used for pod captures that do not name one
pub const DEFAULT_NAMESPACE: &str = "default";

/// A remote cluster declared in configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDescriptor {
    /// Unique cluster name, used as the registry key
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// API server endpoint; descriptors without one are skipped
    #[serde(default, alias = "apiServer")]
    pub api_server: String,
    /// Kubeconfig bundle, either inline YAML/JSON or a path to a file
    #[serde(default, alias = "kubeConfig")]
    pub kube_config: String,
    /// Optional outbound proxy for API server traffic
    #[serde(default)]
    pub proxy: Option<String>,
}

impl ClusterDescriptor {
    /// Proxy address if one is configured and non-empty
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref().filter(|p| !p.trim().is_empty())
    }
}

/// How a capture reaches its target process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Through the cluster API server's pod proxy
    Pod,
    /// Direct HTTP to a network address
    #[serde(alias = "ip", alias = "addr")]
    Address,
}

impl FromStr for CaptureMode {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pod" => Ok(CaptureMode::Pod),
            "address" | "addr" | "ip" => Ok(CaptureMode::Address),
            other => Err(ProbeError::Validation(format!(
                "capture mode ({other}) isn't supported"
            ))),
        }
    }
}

/// A single capture request as received from a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub mode: CaptureMode,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub pod_name: String,
    /// Governance (diagnostics) port of the pod
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub addr: String,
    /// CPU capture duration; only CPU-style sample kinds use it
    #[serde(default)]
    pub seconds: u32,
    #[serde(default)]
    pub token: String,
}

impl CaptureRequest {
    /// Build a pod-mode request
    pub fn pod(
        cluster_name: impl Into<String>,
        namespace: impl Into<String>,
        pod_name: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            mode: CaptureMode::Pod,
            cluster_name: cluster_name.into(),
            namespace: namespace.into(),
            pod_name: pod_name.into(),
            port,
            addr: String::new(),
            seconds: 0,
            token: String::new(),
        }
    }

    /// Build an address-mode request
    pub fn address(addr: impl Into<String>) -> Self {
        Self {
            mode: CaptureMode::Address,
            cluster_name: String::new(),
            namespace: String::new(),
            pod_name: String::new(),
            port: 0,
            addr: addr.into(),
            seconds: 0,
            token: String::new(),
        }
    }

    pub fn with_seconds(mut self, seconds: u32) -> Self {
        self.seconds = seconds;
        self
    }

    /// Check the fields required by the request's mode and resolve its target
    pub fn validate(&self) -> Result<CaptureTarget> {
        match self.mode {
            CaptureMode::Pod => {
                if self.pod_name.trim().is_empty() || self.cluster_name.trim().is_empty() {
                    return Err(ProbeError::Validation(
                        "pod name and cluster name cannot be empty".to_string(),
                    ));
                }
                if self.port == 0 {
                    return Err(ProbeError::Validation(
                        "governance port is not set".to_string(),
                    ));
                }
                let namespace = if self.namespace.trim().is_empty() {
                    DEFAULT_NAMESPACE
                } else {
                    self.namespace.trim()
                };
                let cluster_name = self.cluster_name.trim();
                let pod_name = self.pod_name.trim();
                check_path_segment("cluster name", cluster_name)?;
                check_path_segment("namespace", namespace)?;
                check_path_segment("pod name", pod_name)?;
                Ok(CaptureTarget::Pod {
                    cluster_name: cluster_name.to_string(),
                    namespace: namespace.to_string(),
                    pod_name: pod_name.to_string(),
                    port: self.port,
                })
            }
            CaptureMode::Address => {
                if self.addr.trim().is_empty() {
                    return Err(ProbeError::Validation("addr cannot be empty".to_string()));
                }
                let cluster_name = self.cluster_name.trim();
                if !cluster_name.is_empty() {
                    check_path_segment("cluster name", cluster_name)?;
                }
                Ok(CaptureTarget::Address {
                    cluster_name: cluster_name.to_string(),
                    addr: normalize_addr(&self.addr)?,
                })
            }
        }
    }
}

/// Names end up as single segments of API server paths and artifact keys
fn check_path_segment(field: &str, value: &str) -> Result<()> {
    let bad_char = |c: char| matches!(c, '/' | '\\' | '%') || c.is_whitespace() || c.is_control();
    if value.is_empty() || value == "." || value == ".." || value.contains(bad_char) {
        return Err(ProbeError::Validation(format!(
            "{field} ({value}) isn't a valid path segment"
        )));
    }
    Ok(())
}

/// Accept `[http(s)://]host[:port]`, dropping trailing slashes
fn normalize_addr(addr: &str) -> Result<String> {
    let invalid = || ProbeError::Validation(format!("addr ({addr}) must be [scheme://]host[:port]"));

    let addr_trimmed = addr.trim().trim_end_matches('/');
    let authority = match addr_trimmed.split_once("://") {
        Some(("http" | "https", rest)) => rest,
        Some(_) => return Err(invalid()),
        None => addr_trimmed,
    };

    let bad_char = |c: char| {
        matches!(c, '/' | '\\' | '?' | '#' | '@' | '%') || c.is_whitespace() || c.is_control()
    };
    if authority.is_empty() || authority.contains(bad_char) {
        return Err(invalid());
    }

    // Bracketed IPv6 hosts carry their own colons
    let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
        match after {
            "" => (host, None),
            _ => (host, Some(after.strip_prefix(':').ok_or_else(invalid)?)),
        }
    } else {
        match authority.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    if host.is_empty() || host == "." || host == ".." {
        return Err(invalid());
    }
    if let Some(port) = port {
        if port.parse::<u16>().map_or(true, |p| p == 0) {
            return Err(invalid());
        }
    }

    Ok(addr_trimmed.to_string())
}

/// A validated capture target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTarget {
    Pod {
        cluster_name: String,
        namespace: String,
        pod_name: String,
        port: u16,
    },
    Address {
        /// Optional grouping label; the address is used when empty
        cluster_name: String,
        addr: String,
    },
}

/// Category of runtime sample exposed by a diagnostics endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    /// Contention on synchronization primitives
    Block,
    /// Goroutine scheduling stacks
    Goroutine,
    /// Heap allocations
    Heap,
    /// CPU profile
    Profile,
    /// Wall-clock sampler served outside the pprof tree
    Fgprof,
}

impl SampleKind {
    /// Kinds captured by every request unless configured otherwise
    pub const DEFAULT_SET: [SampleKind; 4] = [
        SampleKind::Block,
        SampleKind::Goroutine,
        SampleKind::Heap,
        SampleKind::Profile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SampleKind::Block => "block",
            SampleKind::Goroutine => "goroutine",
            SampleKind::Heap => "heap",
            SampleKind::Profile => "profile",
            SampleKind::Fgprof => "fgprof",
        }
    }

    /// Whether the endpoint samples for a caller-supplied number of seconds
    pub fn takes_duration(&self) -> bool {
        matches!(self, SampleKind::Profile | SampleKind::Fgprof)
    }

    /// Diagnostics path relative to the target root, without a leading slash
    pub fn diagnostic_path(&self) -> String {
        match self {
            SampleKind::Fgprof => format!("debug/{}", self.as_str()),
            _ => format!("debug/pprof/{}", self.as_str()),
        }
    }
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "block" => Ok(SampleKind::Block),
            "goroutine" => Ok(SampleKind::Goroutine),
            "heap" => Ok(SampleKind::Heap),
            "profile" => Ok(SampleKind::Profile),
            "fgprof" => Ok(SampleKind::Fgprof),
            other => Err(ProbeError::Validation(format!(
                "unknown sample kind: {other}"
            ))),
        }
    }
}

/// Visualization produced from a raw sample dump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderKind {
    Flame,
    #[serde(alias = "profile")]
    Callgraph,
}

impl RenderKind {
    pub const ALL: [RenderKind; 2] = [RenderKind::Flame, RenderKind::Callgraph];

    pub fn as_str(&self) -> &'static str {
        match self {
            RenderKind::Flame => "flame",
            RenderKind::Callgraph => "callgraph",
        }
    }

    /// Suffix of the stored image, `<kind>_<suffix>.svg`
    pub fn file_suffix(&self) -> &'static str {
        match self {
            RenderKind::Flame => "flame",
            RenderKind::Callgraph => "profile",
        }
    }
}

impl fmt::Display for RenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flame" => Ok(RenderKind::Flame),
            "callgraph" | "profile" => Ok(RenderKind::Callgraph),
            other => Err(ProbeError::Validation(format!(
                "no such svg type: {other}"
            ))),
        }
    }
}

/// One retrievable artifact produced by a capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    pub sample_kind: SampleKind,
    pub render_kind: RenderKind,
    pub url: String,
}

/// A previously stored capture recovered from a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredArtifactEntry {
    /// Full request key, usable as the `key` of a graph query
    pub key: String,
    /// Pod name or address the capture was taken from
    pub subject_name: String,
    /// Creation time in epoch seconds
    pub ctime: i64,
}

/// Query for a single stored image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphQuery {
    pub kind: SampleKind,
    pub key: String,
    pub render: RenderKind,
}
