use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use tau_snapshot::{parse_page_block, render_summarized_page_block, PageBlock};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::types::{Summarizer, SummarizerError};

pub const DEFAULT_SUMMARY_THRESHOLD_CHARS: usize = 500;
pub const DEFAULT_SUMMARIZER_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// What happens to a page snapshot when its summarizer call fails.
pub enum SummarizerFailureMode {
    /// Surface the failure to the caller.
    #[default]
    Error,
    /// Keep the original snapshot and log a warning.
    Passthrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Public struct `SnapshotSummaryPolicy` used across Tau components.
pub struct SnapshotSummaryPolicy {
    /// Snapshot bodies shorter than this many characters are left as-is.
    pub threshold_chars: usize,
    pub timeout_ms: u64,
    pub failure_mode: SummarizerFailureMode,
}

impl Default for SnapshotSummaryPolicy {
    fn default() -> Self {
        Self {
            threshold_chars: DEFAULT_SUMMARY_THRESHOLD_CHARS,
            timeout_ms: DEFAULT_SUMMARIZER_TIMEOUT_MS,
            failure_mode: SummarizerFailureMode::Error,
        }
    }
}

impl SnapshotSummaryPolicy {
    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

/// Build the instruction payload sent to the summarizer for one page snapshot.
pub fn build_snapshot_summary_prompt(block: &PageBlock<'_>) -> String {
    format!(
        "Summarize the following accessibility snapshot of a web page in roughly 10 lines.\n\
\n\
Rules:\n\
- Keep every [ref=IDENTIFIER] token attached to an interactive element (links, buttons, inputs, checkboxes, tabs, menu items) exactly as written.\n\
- Collapse repeated, structurally similar elements (for example table rows that each carry the same buttons) to the first 3 followed by \"+ N more similar items\".\n\
- Omit purely decorative content such as images without actions, separators and layout-only containers.\n\
- Reply with the summary lines only, without a preamble or code fences.\n\
\n\
Page title: {title}\n\
Page URL: {url}\n\
\n\
Snapshot:\n\
{body}\n",
        title = block.title,
        url = block.url,
        body = block.body,
    )
}

#[derive(Clone)]
/// Replaces oversized page snapshots inside tool output with a summary.
pub struct SnapshotCompactor {
    summarizer: Option<Arc<dyn Summarizer>>,
    policy: SnapshotSummaryPolicy,
}

impl SnapshotCompactor {
    pub fn new(summarizer: Arc<dyn Summarizer>, policy: SnapshotSummaryPolicy) -> Self {
        Self {
            summarizer: Some(summarizer),
            policy,
        }
    }

    /// Compactor without a backend; page snapshots always pass through.
    pub fn disabled(policy: SnapshotSummaryPolicy) -> Self {
        Self {
            summarizer: None,
            policy,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.summarizer.is_some()
    }

    /// Summarize the first page snapshot in `text` when it reaches the size
    /// threshold. Everything outside the matched block is preserved byte for
    /// byte. Text without a page block, or with a small one, is returned as-is.
    pub async fn compact<'a>(&self, text: &'a str) -> Result<Cow<'a, str>, SummarizerError> {
        let Some(block) = parse_page_block(text) else {
            return Ok(Cow::Borrowed(text));
        };
        let body_chars = block.body_chars();
        if body_chars < self.policy.threshold_chars {
            debug!(
                url = block.url,
                body_chars,
                threshold_chars = self.policy.threshold_chars,
                "page snapshot below summary threshold"
            );
            return Ok(Cow::Borrowed(text));
        }
        let Some(summarizer) = self.summarizer.as_ref() else {
            return Ok(Cow::Borrowed(text));
        };

        let summarized = summarize_block(summarizer.as_ref(), &block, self.policy.timeout())
            .await
            .and_then(|summary| render_shorter_replacement(&block, &summary));
        match summarized {
            Ok(replacement) => {
                debug!(
                    url = block.url,
                    body_chars,
                    replacement_chars = replacement.chars().count(),
                    "page snapshot summarized"
                );
                let mut output = String::with_capacity(text.len());
                output.push_str(&text[..block.span.start]);
                output.push_str(&replacement);
                output.push_str(&text[block.span.end..]);
                Ok(Cow::Owned(output))
            }
            Err(error) if self.policy.failure_mode == SummarizerFailureMode::Passthrough => {
                warn!(
                    url = block.url,
                    body_chars,
                    error = %error,
                    "page snapshot summarization failed; forwarding original snapshot"
                );
                Ok(Cow::Borrowed(text))
            }
            Err(error) => Err(error),
        }
    }
}

/// The rendered block must be strictly shorter than the block it replaces.
fn render_shorter_replacement(
    block: &PageBlock<'_>,
    summary: &str,
) -> Result<String, SummarizerError> {
    let replacement = render_summarized_page_block(block.url, block.title, summary);
    let original_chars = block.full_match.chars().count();
    let summarized_chars = replacement.chars().count();
    if summarized_chars >= original_chars {
        return Err(SummarizerError::SummaryNotShorter {
            original_chars,
            summarized_chars,
        });
    }
    Ok(replacement)
}

async fn summarize_block(
    summarizer: &dyn Summarizer,
    block: &PageBlock<'_>,
    timeout_duration: Duration,
) -> Result<String, SummarizerError> {
    let prompt = build_snapshot_summary_prompt(block);
    let summary = match timeout(timeout_duration, summarizer.summarize(&prompt, timeout_duration))
        .await
    {
        Ok(result) => result?,
        Err(_) => {
            return Err(SummarizerError::Timeout {
                timeout_ms: crate::types::duration_ms(timeout_duration),
            })
        }
    };
    let summary = summary.trim();
    if summary.is_empty() {
        return Err(SummarizerError::EmptyResponse);
    }
    Ok(summary.to_string())
}
