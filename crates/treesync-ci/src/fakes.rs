//! In-memory executor fake (testing only).
//!
//! `ScriptedExecutor` satisfies the [`CommandExecutor`] contract without
//! touching the system: it records every invocation in order and replays
//! scripted outcomes, so step plans can be asserted against exact command
//! sequences.

use std::sync::Mutex;

use async_trait::async_trait;

use treesync_core::Result;

use crate::command::{CommandExecutor, CommandOutcome, CommandSpec};

/// Outcome injected for commands matching a marker string.
#[derive(Debug, Clone)]
struct Failure {
    marker: String,
    exit_code: i32,
    stderr: String,
}

/// Records invocations and replays scripted outcomes (success by default).
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    calls: Mutex<Vec<CommandSpec>>,
    failures: Mutex<Vec<Failure>>,
    stdout_by_marker: Mutex<Vec<(String, String)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every command whose display line contains `marker`.
    pub fn fail_matching(&self, marker: impl Into<String>, exit_code: i32, stderr: impl Into<String>) {
        self.failures.lock().unwrap().push(Failure {
            marker: marker.into(),
            exit_code,
            stderr: stderr.into(),
        });
    }

    /// Emit `stdout` for every command whose display line contains `marker`.
    pub fn stdout_matching(&self, marker: impl Into<String>, stdout: impl Into<String>) {
        self.stdout_by_marker
            .lock()
            .unwrap()
            .push((marker.into(), stdout.into()));
    }

    /// All invocations, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Display lines of all invocations, in order.
    pub fn call_lines(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(CommandSpec::display_line)
            .collect()
    }

    /// Whether any invocation's display line contains `marker`.
    pub fn invoked(&self, marker: &str) -> bool {
        self.call_lines().iter().any(|line| line.contains(marker))
    }

    /// Number of invocations whose display line contains `marker`.
    pub fn invocation_count(&self, marker: &str) -> usize {
        self.call_lines()
            .iter()
            .filter(|line| line.contains(marker))
            .count()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        let line = spec.display_line();
        self.calls.lock().unwrap().push(spec.clone());

        if let Some(failure) = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|f| line.contains(&f.marker))
        {
            return Ok(CommandOutcome {
                exit_code: failure.exit_code,
                stdout: String::new(),
                stderr: failure.stderr.clone(),
                duration_ms: 0,
            });
        }

        let stdout = self
            .stdout_by_marker
            .lock()
            .unwrap()
            .iter()
            .find(|(marker, _)| line.contains(marker))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();

        Ok(CommandOutcome {
            exit_code: 0,
            stdout,
            stderr: String::new(),
            duration_ms: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls_in_order() {
        let executor = ScriptedExecutor::new();
        executor.run(&CommandSpec::new("git").arg("lfs").arg("install")).await.unwrap();
        executor.run(&CommandSpec::new("repo").arg("sync")).await.unwrap();

        let lines = executor.call_lines();
        assert_eq!(lines, vec!["git lfs install", "repo sync"]);
        assert!(executor.invoked("repo sync"));
        assert_eq!(executor.invocation_count("git lfs"), 1);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let executor = ScriptedExecutor::new();
        executor.fail_matching("repo sync", 1, "network down");

        let ok = executor.run(&CommandSpec::new("git").arg("lfs").arg("install")).await.unwrap();
        assert!(ok.success());

        let failed = executor.run(&CommandSpec::new("repo").arg("sync")).await.unwrap();
        assert!(!failed.success());
        assert_eq!(failed.stderr, "network down");
    }

    #[tokio::test]
    async fn test_scripted_stdout() {
        let executor = ScriptedExecutor::new();
        executor.stdout_matching("forall", "core\nefiboot\n");

        let outcome = executor
            .run(&CommandSpec::new("repo").arg("forall").arg("-c").arg("pwd"))
            .await
            .unwrap();
        assert_eq!(outcome.stdout, "core\nefiboot\n");
    }
}
