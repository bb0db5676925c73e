//! Snapshot summarization for the Tau MCP proxy.
//!
//! Defines the `Summarizer` backend contract (Anthropic Messages API or a local
//! command), and the size policy that decides when a page snapshot is replaced
//! by its summary.

pub mod anthropic;
pub mod command;
pub mod snapshot_policy;
pub mod types;

pub use anthropic::{
    AnthropicSummarizer, AnthropicSummarizerConfig, DEFAULT_ANTHROPIC_API_BASE,
    DEFAULT_ANTHROPIC_SUMMARY_MAX_TOKENS, DEFAULT_ANTHROPIC_SUMMARY_MODEL,
};
pub use command::CommandSummarizer;
pub use snapshot_policy::{
    build_snapshot_summary_prompt, SnapshotCompactor, SnapshotSummaryPolicy, SummarizerFailureMode,
    DEFAULT_SUMMARIZER_TIMEOUT_MS, DEFAULT_SUMMARY_THRESHOLD_CHARS,
};
pub use types::{Summarizer, SummarizerError};
