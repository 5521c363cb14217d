//! Error taxonomy for the capture pipeline

use crate::models::SampleKind;
use std::fmt;
use thiserror::Error;

pub type Result<T, E = ProbeError> = std::result::Result<T, E>;

/// Step of the render pipeline that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Scratch,
    Decode,
    Parse,
    FlameInput,
    FlameGraph,
    CallGraph,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderStage::Scratch => "scratch",
            RenderStage::Decode => "decode",
            RenderStage::Parse => "parse",
            RenderStage::FlameInput => "flame_input",
            RenderStage::FlameGraph => "flame_graph",
            RenderStage::CallGraph => "call_graph",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    /// A required request field is missing or malformed
    #[error("invalid request: {0}")]
    Validation(String),

    /// Display text never includes the requested name
    #[error("target cluster may not exist, please retry")]
    ClusterNotFound { name: String },

    #[error("failed to fetch {kind} profile from {url}: {message}")]
    Transport {
        url: String,
        kind: SampleKind,
        status: Option<u16>,
        message: String,
    },

    #[error("render stage {stage} failed: {message}")]
    Render { stage: RenderStage, message: String },

    #[error("artifact storage failed for {key}: {source}")]
    Storage {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("render environment incomplete: {0}")]
    Environment(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("capture task aborted: {0}")]
    Task(String),
}

impl ProbeError {
    pub fn render(stage: RenderStage, message: impl fmt::Display) -> Self {
        ProbeError::Render {
            stage,
            message: message.to_string(),
        }
    }

    pub fn storage(key: impl Into<String>, source: std::io::Error) -> Self {
        ProbeError::Storage {
            key: key.into(),
            source,
        }
    }

    /// Short label used for metrics and structured logs
    pub fn reason(&self) -> &'static str {
        match self {
            ProbeError::Validation(_) => "validation",
            ProbeError::ClusterNotFound { .. } => "cluster_not_found",
            ProbeError::Transport { .. } => "transport",
            ProbeError::Render { .. } => "render",
            ProbeError::Storage { .. } => "storage",
            ProbeError::Environment(_) => "environment",
            ProbeError::Config(_) => "config",
            ProbeError::Task(_) => "task",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_not_found_hides_name() {
        let err = ProbeError::ClusterNotFound {
            name: "internal-prod-7".to_string(),
        };
        assert!(!err.to_string().contains("internal-prod-7"));
        assert_eq!(err.reason(), "cluster_not_found");
    }

    #[test]
    fn test_transport_error_mentions_target_and_kind() {
        let err = ProbeError::Transport {
            url: "http://10.0.0.5:9000/debug/pprof/heap".to_string(),
            kind: SampleKind::Heap,
            status: Some(503),
            message: "status code 503".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("heap"));
        assert!(text.contains("10.0.0.5:9000"));
    }

    #[test]
    fn test_render_error_names_stage() {
        let err = ProbeError::render(RenderStage::FlameGraph, "exit status 2");
        assert_eq!(
            err.to_string(),
            "render stage flame_graph failed: exit status 2"
        );
    }
}
