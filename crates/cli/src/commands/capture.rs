//! Capture commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, ArtifactDescriptor};
use crate::output::{color_render, print_info, print_success, print_warning, OutputFormat};

/// Row for the artifacts table
#[derive(Tabled)]
struct ArtifactRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Render")]
    render: String,
    #[tabled(rename = "URL")]
    url: String,
}

/// Pod addressed through a registered cluster
pub struct PodTarget<'a> {
    pub cluster: &'a str,
    pub namespace: &'a str,
    pub pod: &'a str,
    pub port: u16,
}

/// Capture every configured kind from a pod
pub async fn capture_pod(
    client: &ApiClient,
    target: &PodTarget<'_>,
    seconds: u32,
    token: &str,
    format: OutputFormat,
) -> Result<()> {
    print_info(&format!(
        "Capturing {}/{} on cluster {}",
        target.namespace, target.pod, target.cluster
    ));

    let query = [
        ("mode", "pod".to_string()),
        ("clusterName", target.cluster.to_string()),
        ("namespace", target.namespace.to_string()),
        ("podName", target.pod.to_string()),
        ("port", target.port.to_string()),
        ("seconds", seconds.to_string()),
        ("token", token.to_string()),
    ];

    let artifacts = client.capture(&query, seconds).await?;
    print_artifacts(&artifacts, format)
}

/// Capture every configured kind from a plain address
pub async fn capture_addr(
    client: &ApiClient,
    addr: &str,
    cluster: Option<&str>,
    seconds: u32,
    token: &str,
    format: OutputFormat,
) -> Result<()> {
    print_info(&format!("Capturing {}", addr));

    let mut query = vec![
        ("mode", "address".to_string()),
        ("addr", addr.to_string()),
        ("seconds", seconds.to_string()),
        ("token", token.to_string()),
    ];
    if let Some(cluster) = cluster {
        query.push(("clusterName", cluster.to_string()));
    }

    let artifacts = client.capture(&query, seconds).await?;
    print_artifacts(&artifacts, format)
}

fn print_artifacts(artifacts: &[ArtifactDescriptor], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(artifacts)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if artifacts.is_empty() {
                print_warning("Capture produced no artifacts");
                return Ok(());
            }

            let rows: Vec<ArtifactRow> = artifacts
                .iter()
                .map(|a| ArtifactRow {
                    kind: a.sample_kind.clone(),
                    render: color_render(&a.render_kind),
                    url: a.url.clone(),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            print_success(&format!("Captured {} artifacts", artifacts.len()));
        }
    }

    Ok(())
}
