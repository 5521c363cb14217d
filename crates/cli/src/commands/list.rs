//! Listing stored captures

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, StoredCapture};
use crate::output::{format_ctime, print_warning, OutputFormat};

/// Row for the captures table
#[derive(Tabled)]
struct CaptureRow {
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Captured")]
    captured: String,
    #[tabled(rename = "Key")]
    key: String,
}

/// List captures stored under a cluster and namespace, newest first
pub async fn list_captures(
    client: &ApiClient,
    cluster: &str,
    namespace: &str,
    format: OutputFormat,
) -> Result<()> {
    let mut captures: Vec<StoredCapture> = client
        .get(
            "api/v1/captures",
            &[
                ("clusterName", cluster.to_string()),
                ("namespace", namespace.to_string()),
            ],
        )
        .await?;
    captures.sort_by(|a, b| b.ctime.cmp(&a.ctime));

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&captures)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if captures.is_empty() {
                print_warning(&format!("No captures found under {}/{}", cluster, namespace));
                return Ok(());
            }

            let rows: Vec<CaptureRow> = captures
                .iter()
                .map(|c| CaptureRow {
                    subject: c.subject_name.clone(),
                    captured: format_ctime(c.ctime),
                    key: c.key.clone(),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} captures", captures.len());
        }
    }

    Ok(())
}
