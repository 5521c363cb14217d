//! Profile Probe CLI
//!
//! A command-line tool for triggering profile captures, listing stored
//! captures and downloading rendered graphs from the probe server.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{capture, graph, list};

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Profile Probe CLI
#[derive(Parser)]
#[command(name = "probectl")]
#[command(author, version, about = "CLI for the Profile Probe service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via PROBE_API_URL env var)
    #[arg(long, env = "PROBE_API_URL")]
    pub api_url: Option<String>,

    /// Shared secret required by the capture endpoint
    #[arg(long, env = "PROBE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture profiles from a running process
    #[command(subcommand)]
    Capture(CaptureCommands),

    /// List stored captures for a cluster and namespace
    List {
        /// Cluster name, or the address grouping used for address captures
        #[arg(long, short)]
        cluster: String,

        /// Namespace (`custom` for address captures)
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Download a rendered graph
    Graph {
        /// Capture key, as printed by `list`
        #[arg(long, short)]
        key: String,

        /// Sample kind (block, goroutine, heap, profile, fgprof)
        #[arg(long)]
        kind: String,

        /// Graph type
        #[arg(long, value_enum, default_value = "flame")]
        render: graph::RenderArg,

        /// Output file path (defaults to <kind>_<render>.svg)
        #[arg(long, short)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CaptureCommands {
    /// Capture through the cluster API server's pod proxy
    Pod {
        /// Registered cluster name
        #[arg(long, short)]
        cluster: String,

        /// Pod namespace
        #[arg(long, short)]
        namespace: Option<String>,

        /// Pod name
        #[arg(long, short)]
        pod: String,

        /// Diagnostics (governance) port of the pod
        #[arg(long)]
        port: u16,

        /// CPU capture duration in seconds
        #[arg(long, default_value_t = 0)]
        seconds: u32,
    },

    /// Capture directly from a network address
    Addr {
        /// Target address, e.g. 10.0.0.5:9000
        #[arg(long, short)]
        addr: String,

        /// Optional grouping label used in place of the address when listing
        #[arg(long, short)]
        cluster: Option<String>,

        /// CPU capture duration in seconds
        #[arg(long, default_value_t = 0)]
        seconds: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::Config::load()?;

    let api_url = cli
        .api_url
        .or(settings.api_url.clone())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let token = cli.token.or(settings.token.clone()).unwrap_or_default();
    let format = cli.format.unwrap_or_else(|| settings.format());

    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Capture(capture_cmd) => match capture_cmd {
            CaptureCommands::Pod {
                cluster,
                namespace,
                pod,
                port,
                seconds,
            } => {
                let namespace = settings.namespace(namespace);
                let target = capture::PodTarget {
                    cluster: &cluster,
                    namespace: &namespace,
                    pod: &pod,
                    port,
                };
                capture::capture_pod(&client, &target, seconds, &token, format).await?;
            }
            CaptureCommands::Addr {
                addr,
                cluster,
                seconds,
            } => {
                capture::capture_addr(&client, &addr, cluster.as_deref(), seconds, &token, format)
                    .await?;
            }
        },
        Commands::List { cluster, namespace } => {
            let namespace = settings.namespace(namespace);
            list::list_captures(&client, &cluster, &namespace, format).await?;
        }
        Commands::Graph {
            key,
            kind,
            render,
            output,
        } => {
            graph::download_graph(&client, &key, &kind, render, output).await?;
        }
    }

    Ok(())
}
