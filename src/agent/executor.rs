//! Subprocess execution for rendered actions

use crate::core::error::{ReconError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

/// Runs a rendered command line and returns its stdout
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command_line: &str) -> Result<String>;
}

/// Runs commands as child processes with a hard timeout
///
/// The command line is split on whitespace; no shell is involved. A child
/// still running at the deadline is killed.
pub struct ShellRunner {
    timeout: Duration,
}

impl ShellRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command_line: &str) -> Result<String> {
        let mut argv = command_line.split_whitespace();
        let program = argv
            .next()
            .ok_or_else(|| ReconError::Command("empty command line".into()))?;

        let mut cmd = TokioCommand::new(program);
        cmd.args(argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(command = command_line, "spawning");
        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ReconError::Command(format!("{}: {}", command_line, e))),
            Err(_) => {
                return Err(ReconError::CommandTimeout(
                    self.timeout.as_secs(),
                    command_line.to_string(),
                ))
            }
        };

        if !output.status.success() && output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReconError::Command(format!(
                "{} exited with {}: {}",
                command_line,
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_and_captures_stdout() {
        let runner = ShellRunner::default();
        let out = runner.run("echo 22/tcp open ssh").await.unwrap();
        assert_eq!(out.trim(), "22/tcp open ssh");
    }

    #[tokio::test]
    async fn test_empty_command_is_error() {
        let runner = ShellRunner::default();
        assert!(matches!(runner.run("   ").await, Err(ReconError::Command(_))));
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        let runner = ShellRunner::default();
        assert!(runner.run("definitely-not-a-real-binary-xyz --flag").await.is_err());
    }

    #[tokio::test]
    async fn test_timeout_kills() {
        let runner = ShellRunner::new(Duration::from_millis(100));
        let result = runner.run("sleep 5").await;
        assert!(matches!(result, Err(ReconError::CommandTimeout(_, _))));
    }
}
