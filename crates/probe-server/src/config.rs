//! Server configuration
//!
//! Read from an optional YAML file (`PROBE_CONFIG`, default
//! `config/probe.yaml`) overlaid with `PROBE_*` environment variables.
//! Nested keys use `__`, e.g. `PROBE_STORAGE__BASE_PATH`.

use anyhow::{Context, Result};
use probe_lib::models::{ClusterDescriptor, SampleKind};
use probe_lib::render::DEFAULT_FLAMEGRAPH_SCRIPTS;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const CONFIG_PATH_ENV: &str = "PROBE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/probe.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Port serving the capture, graph and health endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Externally reachable root, used to build retrieval URLs
    #[serde(default = "default_root_url")]
    pub root_url: String,

    /// Shared secret every capture request must present
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub clusters: Vec<ClusterDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Where raw dumps are staged for the external tools
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Sample type drawn in flame graphs; empty picks the first
    #[serde(default)]
    pub sample_index: String,

    /// Flame graph generators, first resolvable wins
    #[serde(default = "default_flamegraph_scripts")]
    pub flamegraph_scripts: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            sample_index: String::new(),
            flamegraph_scripts: default_flamegraph_scripts(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_sample_kinds")]
    pub sample_kinds: Vec<SampleKind>,

    /// Address-mode fetch timeout when no capture duration applies
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_kinds: default_sample_kinds(),
            default_timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

fn default_root_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_base_path() -> PathBuf {
    PathBuf::from("/tmp/probe-artifacts")
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("probe-scratch")
}

fn default_flamegraph_scripts() -> Vec<String> {
    DEFAULT_FLAMEGRAPH_SCRIPTS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_sample_kinds() -> Vec<SampleKind> {
    SampleKind::DEFAULT_SET.to_vec()
}

fn default_timeout_secs() -> u64 {
    5
}

impl ProbeConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from(Path::new(&path), true),
            Err(_) => Self::load_from(Path::new(DEFAULT_CONFIG_PATH), false),
        }
    }

    /// Load from `path` (skipped when absent unless `required`) and environment
    pub fn load_from(path: &Path, required: bool) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(required))
            .add_source(environment())
            .build()
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;

        let config: ProbeConfig = config
            .try_deserialize()
            .context("invalid probe configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.capture.sample_kinds.is_empty() {
            anyhow::bail!("capture.sample_kinds must name at least one sample kind");
        }
        if self.render.flamegraph_scripts.is_empty() {
            anyhow::bail!("render.flamegraph_scripts must name at least one generator");
        }
        Ok(())
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("PROBE")
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("capture.sample_kinds")
        .with_list_parse_key("render.flamegraph_scripts")
        .try_parsing(true)
}
