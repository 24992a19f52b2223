//! Supervision of the packager and bundler processes.
//!
//! Tools are spawned in the project root with `kill_on_drop`, awaited until
//! their port accepts connections, and killed and reaped on shutdown so no
//! handle outlives the server.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use rnws_shared::{Result, RnwsError, ServerConfig};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Interval between readiness checks.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A fully resolved tool command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ToolSpec {
    pub name: &'static str,
    pub program: String,
    pub args: Vec<String>,
    pub port: u16,
    pub ready_timeout: Duration,
}

impl ToolSpec {
    /// The enabled tools for a server config, placeholders substituted.
    pub fn from_config(config: &ServerConfig) -> Result<Vec<ToolSpec>> {
        let project = &config.project;
        let candidates = [
            (
                "packager",
                &project.packager,
                project.packager_command(),
                project.packager_hot_args(),
                config.packager_port,
            ),
            (
                "bundler",
                &project.bundler,
                project.bundler_command(),
                project.bundler_hot_args(),
                config.bundler_port,
            ),
        ];

        let mut specs = Vec::new();
        for (name, tool, mut command, hot_args, port) in candidates {
            if !tool.enabled {
                debug!(tool = name, "tool disabled, not launching");
                continue;
            }
            if port == 0 {
                return Err(RnwsError::config(format!(
                    "{name} is enabled but has no port; set a non-zero port or disable it"
                )));
            }
            if command.is_empty() {
                return Err(RnwsError::config(format!(
                    "{name} is enabled but its command is empty"
                )));
            }
            if config.hot {
                command.extend(hot_args);
            }

            let config_path = config.bundler.config_path.display().to_string();
            let project_root = config.project_root.display().to_string();
            let vars = Placeholders {
                hostname: &config.hostname,
                port,
                config: &config_path,
                project_root: &project_root,
            };
            let mut resolved = command.iter().map(|arg| vars.substitute(arg));
            let program = resolved.next().unwrap_or_default();

            specs.push(ToolSpec {
                name,
                program,
                args: resolved.collect(),
                port,
                ready_timeout: Duration::from_secs(tool.ready_timeout_secs),
            });
        }

        Ok(specs)
    }
}

struct Placeholders<'a> {
    hostname: &'a str,
    port: u16,
    config: &'a str,
    project_root: &'a str,
}

impl Placeholders<'_> {
    fn substitute(&self, arg: &str) -> String {
        arg.replace("{hostname}", self.hostname)
            .replace("{port}", &self.port.to_string())
            .replace("{config}", self.config)
            .replace("{project_root}", self.project_root)
    }
}

struct SupervisedTool {
    name: &'static str,
    child: Child,
}

/// Owns every tool process a build server launched.
#[derive(Default)]
pub(crate) struct ToolSupervisor {
    tools: Vec<SupervisedTool>,
}

impl ToolSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch every spec in order, waiting for each to become ready.
    ///
    /// On failure the tools launched so far stay registered; the caller is
    /// expected to [`shutdown`](Self::shutdown).
    pub async fn launch_all(
        &mut self,
        specs: &[ToolSpec],
        hostname: &str,
        project_root: &Path,
    ) -> Result<()> {
        for spec in specs {
            self.launch(spec, hostname, project_root).await?;
        }
        Ok(())
    }

    async fn launch(&mut self, spec: &ToolSpec, hostname: &str, project_root: &Path) -> Result<()> {
        info!(
            tool = spec.name,
            program = %spec.program,
            port = spec.port,
            "launching tool"
        );

        let child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RnwsError::server_start(format!(
                    "failed to spawn {}: {e}. Is `{}` installed?",
                    spec.name, spec.program
                ))
            })?;

        self.tools.push(SupervisedTool {
            name: spec.name,
            child,
        });
        let tool = self
            .tools
            .last_mut()
            .ok_or_else(|| RnwsError::server_start("tool registry empty after spawn"))?;

        wait_ready(tool, hostname, spec.port, spec.ready_timeout).await?;
        info!(tool = spec.name, port = spec.port, "tool ready");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Kill and reap every tool. Attempts all of them; returns the first error.
    pub async fn shutdown(&mut self) -> Result<()> {
        let mut first_error = None;

        for mut tool in self.tools.drain(..) {
            match tool.child.try_wait() {
                Ok(Some(status)) => {
                    debug!(tool = tool.name, %status, "tool already exited");
                    continue;
                }
                Ok(None) => {}
                Err(e) => warn!(tool = tool.name, error = %e, "could not poll tool status"),
            }

            // kill() also waits, so the process is reaped here
            match tool.child.kill().await {
                Ok(()) => debug!(tool = tool.name, "tool stopped"),
                Err(e) => {
                    warn!(tool = tool.name, error = %e, "failed to stop tool");
                    first_error.get_or_insert(RnwsError::Tooling(format!(
                        "failed to stop {}: {e}",
                        tool.name
                    )));
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

/// Poll until the tool accepts TCP connections, exits, or times out.
async fn wait_ready(
    tool: &mut SupervisedTool,
    hostname: &str,
    port: u16,
    timeout: Duration,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if TcpStream::connect((hostname, port)).await.is_ok() {
            return Ok(());
        }

        if let Ok(Some(status)) = tool.child.try_wait() {
            return Err(RnwsError::server_start(format!(
                "{} exited before accepting connections on port {port} ({status})",
                tool.name
            )));
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(RnwsError::server_start(format!(
                "{} did not accept connections on {hostname}:{port} within {}s",
                tool.name,
                timeout.as_secs()
            )));
        }

        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}
