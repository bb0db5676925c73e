use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::types::{duration_ms, Summarizer, SummarizerError};

#[derive(Debug, Clone)]
/// Summarizer backed by a local command: the prompt is written to its stdin and
/// the summary is read from its stdout.
pub struct CommandSummarizer {
    program: String,
    args: Vec<String>,
}

impl CommandSummarizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Result<Self, SummarizerError> {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(SummarizerError::InvalidConfig(
                "summarizer command cannot be empty".to_string(),
            ));
        }
        Ok(Self { program, args })
    }

    async fn run(&self, prompt: &str) -> Result<String, SummarizerError> {
        let mut child = Command::new(self.program.trim())
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SummarizerError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            SummarizerError::InvalidResponse("summarizer command stdin unavailable".to_string())
        })?;
        let write_prompt = async move {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await
        };
        let (write_result, output) = tokio::join!(write_prompt, child.wait_with_output());
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let detail = if !stderr.is_empty() {
                stderr
            } else if !stdout.is_empty() {
                stdout
            } else {
                "no output".to_string()
            };
            return Err(SummarizerError::CommandFailed {
                status: output.status.to_string(),
                detail,
            });
        }
        write_result?;

        let summary = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if summary.is_empty() {
            return Err(SummarizerError::EmptyResponse);
        }
        Ok(summary)
    }
}

#[async_trait]
impl Summarizer for CommandSummarizer {
    async fn summarize(
        &self,
        prompt: &str,
        timeout_duration: Duration,
    ) -> Result<String, SummarizerError> {
        // Dropping the pending future drops the child, and kill_on_drop reaps it.
        match timeout(timeout_duration, self.run(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(SummarizerError::Timeout {
                timeout_ms: duration_ms(timeout_duration),
            }),
        }
    }
}
