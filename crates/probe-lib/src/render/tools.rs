//! External rendering tools
//!
//! Decoding and both images are produced by external programs: the Go
//! toolchain's `pprof` (raw listing and call-graph SVG, the latter via
//! graphviz `dot`) and a FlameGraph script reading folded stacks on stdin.

use crate::error::{ProbeError, RenderStage, Result};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Flame-graph generator names tried in order
pub const DEFAULT_FLAMEGRAPH_SCRIPTS: [&str; 5] = [
    "flamegraph",
    "flamegraph.pl",
    "./flamegraph.pl",
    "./FlameGraph/flamegraph.pl",
    "flame-graph-gen",
];

/// Boundary to the programs that decode and draw profiles
#[async_trait]
pub trait RenderTool: Send + Sync {
    /// Decode a raw dump into its textual listing
    async fn decode_raw(&self, raw_path: &Path) -> Result<String>;

    /// Draw a flame graph from folded stack lines
    async fn render_flame(&self, input: &[String]) -> Result<Vec<u8>>;

    /// Draw a call graph from a raw dump
    async fn render_callgraph(&self, raw_path: &Path) -> Result<Vec<u8>>;
}

/// `RenderTool` backed by `go tool pprof` and a FlameGraph script
#[derive(Debug, Clone)]
pub struct ExternalTools {
    go_binary: PathBuf,
    flamegraph_script: PathBuf,
}

impl ExternalTools {
    pub fn new(go_binary: impl Into<PathBuf>, flamegraph_script: impl Into<PathBuf>) -> Self {
        Self {
            go_binary: go_binary.into(),
            flamegraph_script: flamegraph_script.into(),
        }
    }

    /// Verify that every required tool is present and resolve their paths
    ///
    /// Meant to run once at startup; a failure here should keep the
    /// service from accepting captures at all.
    pub async fn discover<S: AsRef<str>>(flamegraph_candidates: &[S]) -> Result<Self> {
        let go_binary = find_executable("go")
            .ok_or_else(|| ProbeError::Environment("`go` not found on PATH".to_string()))?;
        probe_command(&go_binary, &["version"]).await?;

        let dot = find_executable("dot").ok_or_else(|| {
            ProbeError::Environment("graphviz `dot` not found on PATH".to_string())
        })?;
        probe_command(&dot, &["-V"]).await?;

        let flamegraph_script = flamegraph_candidates
            .iter()
            .find_map(|candidate| find_executable(candidate.as_ref()))
            .ok_or_else(|| {
                ProbeError::Environment("flame graph script not found".to_string())
            })?;

        info!(
            go = %go_binary.display(),
            dot = %dot.display(),
            flamegraph = %flamegraph_script.display(),
            "Render environment verified"
        );
        Ok(Self::new(go_binary, flamegraph_script))
    }

    pub fn flamegraph_script(&self) -> &Path {
        &self.flamegraph_script
    }

    fn pprof(&self, flag: &str, raw_path: &Path) -> Command {
        let mut command = Command::new(&self.go_binary);
        command.args(["tool", "pprof", flag]).arg(raw_path);
        command
    }
}

#[async_trait]
impl RenderTool for ExternalTools {
    async fn decode_raw(&self, raw_path: &Path) -> Result<String> {
        let output = run(RenderStage::Decode, self.pprof("-raw", raw_path), None).await?;
        String::from_utf8(output)
            .map_err(|e| ProbeError::render(RenderStage::Decode, format!("listing is not UTF-8: {e}")))
    }

    async fn render_flame(&self, input: &[String]) -> Result<Vec<u8>> {
        let mut stdin = input.join("\n");
        stdin.push('\n');
        run(
            RenderStage::FlameGraph,
            Command::new(&self.flamegraph_script),
            Some(stdin.into_bytes()),
        )
        .await
    }

    async fn render_callgraph(&self, raw_path: &Path) -> Result<Vec<u8>> {
        run(RenderStage::CallGraph, self.pprof("-svg", raw_path), None).await
    }
}

/// Run a command to completion and return its stdout
async fn run(stage: RenderStage, mut command: Command, stdin: Option<Vec<u8>>) -> Result<Vec<u8>> {
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let program = command.as_std().get_program().to_string_lossy().into_owned();
    debug!(stage = %stage, program = %program, "Running render tool");

    let mut child = command
        .spawn()
        .map_err(|e| ProbeError::render(stage, format!("failed to start {program}: {e}")))?;

    // Feed stdin while stdout drains; tools may write before reading all their input
    let pipe = child.stdin.take();
    let feed = async move {
        match (stdin, pipe) {
            (Some(input), Some(mut pipe)) => {
                let written = pipe.write_all(&input).await;
                drop(pipe);
                written
            }
            _ => Ok(()),
        }
    };
    let (written, output) = tokio::join!(feed, child.wait_with_output());
    let output =
        output.map_err(|e| ProbeError::render(stage, format!("{program} did not complete: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::render(
            stage,
            format!("{program} exited with {}: {}", output.status, stderr.trim()),
        ));
    }
    written.map_err(|e| ProbeError::render(stage, format!("failed to write input: {e}")))?;
    Ok(output.stdout)
}

async fn probe_command(program: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            ProbeError::Environment(format!(
                "there was an error running '{} {}': {e}",
                program.display(),
                args.join(" ")
            ))
        })?;

    if !output.status.success() {
        return Err(ProbeError::Environment(format!(
            "'{} {}' exited with {}",
            program.display(),
            args.join(" "),
            output.status
        )));
    }
    Ok(())
}

/// Resolve a program name the way a shell would
///
/// Names containing a path separator are checked relative to the working
/// directory; bare names are searched on `PATH`.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    search_path(OsStr::new(name), &path)
}

fn search_path(name: &OsStr, path: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path)
        .map(|dir| dir.join(name))
        .find(|full| is_executable(full))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
