use std::borrow::Cow;

use futures_util::future::try_join_all;
use serde_json::Value;
use tau_snapshot::collapse_event_log;
use tau_summarizer::{SnapshotCompactor, SummarizerError};
use thiserror::Error;
use tracing::debug;

use crate::tool_alias::SkipSet;

const MCP_CONTENT_TYPE_TEXT: &str = "text";

#[derive(Debug, Error)]
/// Enumerates supported `RewriteError` values.
pub enum RewriteError {
    #[error("failed to summarize page snapshot returned by tool '{tool_name}': {source}")]
    Summarizer {
        tool_name: String,
        #[source]
        source: SummarizerError,
    },
}

/// Compacts the text content of tool call results.
pub struct ToolResponseRewriter {
    compactor: SnapshotCompactor,
    skip: SkipSet,
}

impl ToolResponseRewriter {
    pub fn new(compactor: SnapshotCompactor, skip: SkipSet) -> Self {
        Self { compactor, skip }
    }

    pub fn skips(&self, tool_name: &str) -> bool {
        self.skip.contains(tool_name)
    }

    /// Rewrite the `content[]` text items of a tool call result.
    ///
    /// Returns `Ok(None)` when nothing changed. Text items are processed
    /// concurrently; the output keeps the input order and `result` itself is
    /// never modified.
    pub async fn rewrite_result(
        &self,
        tool_name: &str,
        result: &Value,
    ) -> Result<Option<Value>, RewriteError> {
        if self.skips(tool_name) {
            debug!(tool_name, "tool output forwarded without compaction");
            return Ok(None);
        }
        let Some(items) = result.get("content").and_then(Value::as_array) else {
            return Ok(None);
        };

        let rewrites = try_join_all(items.iter().map(|item| async move {
            match text_item(item) {
                Some(text) => self.rewrite_text(tool_name, text).await,
                None => Ok(None),
            }
        }))
        .await?;

        if rewrites.iter().all(Option::is_none) {
            return Ok(None);
        }

        let mut rewritten = result.clone();
        if let Some(content) = rewritten.get_mut("content").and_then(Value::as_array_mut) {
            for (item, rewrite) in content.iter_mut().zip(rewrites) {
                let Some(text) = rewrite else {
                    continue;
                };
                if let Some(object) = item.as_object_mut() {
                    object.insert("text".to_string(), Value::String(text));
                }
            }
        }
        Ok(Some(rewritten))
    }

    async fn rewrite_text(
        &self,
        tool_name: &str,
        text: &str,
    ) -> Result<Option<String>, RewriteError> {
        let compacted =
            self.compactor
                .compact(text)
                .await
                .map_err(|source| RewriteError::Summarizer {
                    tool_name: tool_name.to_string(),
                    source,
                })?;
        let collapsed = match collapse_event_log(&compacted) {
            Cow::Borrowed(_) => None,
            Cow::Owned(collapsed) => Some(collapsed),
        };
        match (compacted, collapsed) {
            (_, Some(collapsed)) => Ok(Some(collapsed)),
            (Cow::Owned(compacted), None) => Ok(Some(compacted)),
            (Cow::Borrowed(_), None) => Ok(None),
        }
    }
}

fn text_item(item: &Value) -> Option<&str> {
    if item.get("type").and_then(Value::as_str) != Some(MCP_CONTENT_TYPE_TEXT) {
        return None;
    }
    item.get("text").and_then(Value::as_str)
}
