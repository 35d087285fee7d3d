//! External command execution layer.
//!
//! Every external tool the orchestrator touches (the manifest-sync tool, the
//! LFS client, the transfer client, archivers) goes through the
//! [`CommandExecutor`] trait so the step engine can be exercised against an
//! in-memory fake. The real executor spawns via `tokio::process` with piped
//! output. No internal timeouts: timeouts are owned by the invoking CI
//! engine, which may kill the whole pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use treesync_core::{Result, SyncError};

/// Specification of one external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name.
    pub program: String,

    /// Arguments, in order.
    pub args: Vec<String>,

    /// Extra environment variables set for this invocation only.
    pub env: BTreeMap<String, String>,

    /// Working directory, when it differs from the process default.
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// A bash invocation of the given script, with pipefail semantics.
    pub fn bash(script: impl Into<String>) -> Self {
        CommandSpec::new("/usr/bin/env")
            .arg("bash")
            .arg("-c")
            .arg(format!("set -e -u -o pipefail\n{}", script.into()))
    }

    /// Single-line rendering for logs and error messages.
    pub fn display_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(char::is_whitespace) {
                line.push_str(&format!("{arg:?}"));
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Outcome of one external command invocation.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// Exit code (-1 when terminated by signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandOutcome {
    /// Whether the command exited zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Convert a failed outcome into the step-level error.
    pub fn into_step_result(self, step: &str) -> Result<CommandOutcome> {
        if self.success() {
            Ok(self)
        } else {
            Err(SyncError::CommandFailed {
                step: step.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr,
            })
        }
    }
}

/// Executes external commands and reports their outcome.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome>;
}

/// Real executor backed by `tokio::process`.
#[derive(Debug, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        let start = Instant::now();
        debug!(command = %spec.display_line(), "running external command");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let child = command.spawn().map_err(|e| SyncError::CommandSpawn {
            program: spec.program.clone(),
            reason: e.to_string(),
        })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SyncError::CommandSpawn {
                program: spec.program.clone(),
                reason: e.to_string(),
            })?;

        Ok(CommandOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
