//! Graph download

use anyhow::{Context, Result};
use clap::ValueEnum;

use crate::client::ApiClient;
use crate::output::{format_bytes, print_success};

/// Graph type accepted by the server
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RenderArg {
    Flame,
    Callgraph,
}

impl RenderArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderArg::Flame => "flame",
            RenderArg::Callgraph => "callgraph",
        }
    }
}

/// Download one rendered graph and write it to disk
pub async fn download_graph(
    client: &ApiClient,
    key: &str,
    kind: &str,
    render: RenderArg,
    output: Option<String>,
) -> Result<()> {
    let svg = client
        .get_bytes(
            "api/v1/graph",
            &[
                ("kind", kind.to_string()),
                ("key", key.to_string()),
                ("render", render.as_str().to_string()),
            ],
        )
        .await?;

    let path = output.unwrap_or_else(|| default_output(kind, render));
    std::fs::write(&path, &svg).with_context(|| format!("Failed to write {}", path))?;

    print_success(&format!(
        "Saved {} graph to {} ({})",
        render.as_str(),
        path,
        format_bytes(svg.len() as u64)
    ));
    Ok(())
}

fn default_output(kind: &str, render: RenderArg) -> String {
    format!("{}_{}.svg", kind, render.as_str())
}
