//! Child-process executor for the version-control backend CLI.
//!
//! All process failure modes (non-zero exit, timeout, spawn error) are
//! captured into [`CommandResult`]; nothing escapes the runner boundary
//! as a panic or error value.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::{info, warn};

mod config;

pub use config::{P4Config, DEFAULT_P4_BIN, DEFAULT_P4_CLIENT, DEFAULT_P4_PORT, DEFAULT_P4_USER};

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Tri-state outcome of one backend invocation.
///
/// Exactly one of `output` / `error` is populated; `succeeded == false`
/// implies `error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub succeeded: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl CommandResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            output: None,
            error: Some(error.into()),
        }
    }

    pub fn output_text(&self) -> &str {
        self.output.as_deref().unwrap_or_default()
    }

    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }
}

/// Per-invocation overrides; unset fields fall back to runner defaults.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub working_dir: Option<std::path::PathBuf>,
    pub timeout: Option<Duration>,
}

/// Seam between endpoint handlers and the real CLI, so tests can inject
/// a stub backend.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, args: &[String]) -> CommandResult;
}

/// Production runner spawning the configured backend binary.
pub struct CliRunner {
    config: P4Config,
    default_timeout: Duration,
}

impl CliRunner {
    pub fn new(config: P4Config) -> Self {
        Self {
            config,
            default_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn config(&self) -> &P4Config {
        &self.config
    }

    /// Run the backend CLI with a discrete argument vector. Values are
    /// never passed through a shell, so embedded metacharacters stay
    /// opaque tokens for the backend.
    pub async fn run_with(&self, args: &[String], overrides: RunOverrides) -> CommandResult {
        let timeout = overrides.timeout.unwrap_or(self.default_timeout);
        let working_dir = overrides
            .working_dir
            .unwrap_or_else(|| self.config.workspace_root.clone());
        let command_line = format!("{} {}", self.config.binary, args.join(" "));

        info!(command = %command_line, cwd = %working_dir.display(), "running backend command");

        let mut cmd = Command::new(&self.config.binary);
        cmd.args(args)
            .current_dir(&working_dir)
            .envs(self.config.backend_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                let message = format!("failed to start {}: {}", self.config.binary, err);
                warn!(command = %command_line, error = %message, "spawn failed");
                return CommandResult::failure(message);
            }
        };

        // Dropping the output future on timeout kills the child via
        // kill_on_drop, so no process outlives its deadline.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                let message = format!("failed to collect command output: {err}");
                warn!(command = %command_line, error = %message, "wait failed");
                return CommandResult::failure(message);
            }
            Err(_) => {
                let message = format!("command timed out after {}s", timeout.as_secs_f64());
                warn!(command = %command_line, "command timed out");
                return CommandResult::failure(message);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            if !stderr.is_empty() {
                // Advisory chatter on stderr with a clean exit does not
                // flip the outcome.
                warn!(command = %command_line, stderr = %stderr, "backend wrote diagnostics on stderr");
            }
            info!(command = %command_line, bytes = stdout.len(), "backend command succeeded");
            CommandResult::success(stdout)
        } else {
            let detail = if stderr.is_empty() { &stdout } else { &stderr };
            let message = match output.status.code() {
                Some(code) => format!("command exited with status {code}: {detail}"),
                None => format!("command terminated by signal: {detail}"),
            };
            warn!(command = %command_line, error = %message, "backend command failed");
            CommandResult::failure(message)
        }
    }
}

#[async_trait]
impl Runner for CliRunner {
    async fn run(&self, args: &[String]) -> CommandResult {
        self.run_with(args, RunOverrides::default()).await
    }
}
