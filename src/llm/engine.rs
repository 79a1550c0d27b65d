//! The text-generation seam: `run(prompt) -> text`

use crate::core::error::{ReconError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

#[async_trait]
pub trait LlmEngine: Send + Sync {
    async fn run(&self, prompt: &str) -> Result<String>;

    /// Token estimate used for budget checks
    fn count_tokens(&self, text: &str) -> usize {
        estimate_tokens(text)
    }
}

/// Roughly four characters per token
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

/// Runs an external program with the prompt on stdin and reads stdout
pub struct ProcessEngine {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessEngine {
    /// `command_line` is split on whitespace
    pub fn new(command_line: &str, timeout: Duration) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| ReconError::Config("llm.command is empty".into()))?;
        Ok(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }
}

#[async_trait]
impl LlmEngine for ProcessEngine {
    async fn run(&self, prompt: &str) -> Result<String> {
        let mut child = TokioCommand::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ReconError::LlmError(format!("{}: {}", self.program, e)))?;

        // Feeding stdin and collecting output share one deadline; the child
        // is killed if either stalls.
        let stdin = child.stdin.take();
        let exchange = async move {
            let feed = async {
                if let Some(mut stdin) = stdin {
                    stdin.write_all(prompt.as_bytes()).await?;
                }
                Ok::<_, std::io::Error>(())
            };
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            fed?;
            output
        };

        let output = timeout(self.timeout, exchange)
            .await
            .map_err(|_| ReconError::LlmError(format!("{} timed out", self.program)))??;

        if !output.status.success() {
            return Err(ReconError::LlmError(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
