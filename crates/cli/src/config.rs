//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

/// Defaults read from `~/.config/probectl/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// API endpoint URL
    pub api_url: Option<String>,
    /// Shared secret for the capture endpoint
    pub token: Option<String>,
    /// Default namespace
    pub default_namespace: Option<String>,
    /// Default output format (`table` or `json`)
    pub default_format: Option<String>,
}

impl Config {
    /// Load configuration from the user's config file, if any
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Namespace given on the command line, else the configured default, else `default`
    pub fn namespace(&self, explicit: Option<String>) -> String {
        explicit
            .or_else(|| self.default_namespace.clone())
            .unwrap_or_else(|| "default".to_string())
    }

    pub fn format(&self) -> OutputFormat {
        match self.default_format.as_deref() {
            Some(f) if f.eq_ignore_ascii_case("json") => OutputFormat::Json,
            _ => OutputFormat::Table,
        }
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("probectl").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load_from(Path::new("/nonexistent/probectl.json")).unwrap();
        assert!(config.api_url.is_none());
        assert_eq!(config.namespace(None), "default");
        assert!(matches!(config.format(), OutputFormat::Table));
    }

    #[test]
    fn test_explicit_values_win() {
        let config: Config = serde_json::from_str(
            r#"{"api_url": "http://probe:8080", "default_namespace": "payments", "default_format": "json"}"#,
        )
        .unwrap();

        assert_eq!(config.namespace(None), "payments");
        assert_eq!(config.namespace(Some("infra".to_string())), "infra");
        assert!(matches!(config.format(), OutputFormat::Json));
    }
}
