use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
/// Enumerates supported `SummarizerError` values.
pub enum SummarizerError {
    #[error("invalid summarizer configuration: {0}")]
    InvalidConfig(String),
    #[error("summarizer timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    #[error("failed to launch summarizer command '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("summarizer command exited with status {status}: {detail}")]
    CommandFailed { status: String, detail: String },
    #[error("summarizer io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("summarizer returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("invalid summarizer response: {0}")]
    InvalidResponse(String),
    #[error("summarizer returned no text content")]
    EmptyResponse,
    #[error("summarized page block ({summarized_chars} chars) is not shorter than the original ({original_chars} chars)")]
    SummaryNotShorter {
        original_chars: usize,
        summarized_chars: usize,
    },
}

#[async_trait]
/// Trait contract for text summarization backends.
///
/// Implementations return the summary text or fail; they must give up once
/// `timeout` has elapsed.
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, prompt: &str, timeout: Duration) -> Result<String, SummarizerError>;
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}
