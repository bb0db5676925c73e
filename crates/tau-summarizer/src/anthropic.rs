use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::types::{duration_ms, Summarizer, SummarizerError};

pub const DEFAULT_ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_ANTHROPIC_SUMMARY_MODEL: &str = "claude-3-5-haiku-latest";
pub const DEFAULT_ANTHROPIC_SUMMARY_MAX_TOKENS: u32 = 1_024;
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
/// Public struct `AnthropicSummarizerConfig` used across Tau components.
pub struct AnthropicSummarizerConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for AnthropicSummarizerConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_ANTHROPIC_API_BASE.to_string(),
            api_key: String::new(),
            model: DEFAULT_ANTHROPIC_SUMMARY_MODEL.to_string(),
            max_tokens: DEFAULT_ANTHROPIC_SUMMARY_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Clone)]
/// Summarizer backed by the Anthropic Messages API.
pub struct AnthropicSummarizer {
    client: reqwest::Client,
    config: AnthropicSummarizerConfig,
}

impl AnthropicSummarizer {
    pub fn new(config: AnthropicSummarizerConfig) -> Result<Self, SummarizerError> {
        if config.api_key.trim().is_empty() {
            return Err(SummarizerError::InvalidConfig(
                "anthropic summarizer requires an API key".to_string(),
            ));
        }
        if config.model.trim().is_empty() {
            return Err(SummarizerError::InvalidConfig(
                "anthropic summarizer model cannot be empty".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(config.api_key.trim()).map_err(|error| {
                SummarizerError::InvalidConfig(format!("invalid API key header: {error}"))
            })?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/messages") {
            return base.to_string();
        }
        format!("{base}/messages")
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.config.model.trim(),
            "max_tokens": self.config.max_tokens.max(1),
            "messages": [
                {"role": "user", "content": prompt}
            ]
        })
    }
}

#[async_trait]
impl Summarizer for AnthropicSummarizer {
    async fn summarize(
        &self,
        prompt: &str,
        timeout_duration: Duration,
    ) -> Result<String, SummarizerError> {
        let response = self
            .client
            .post(self.messages_url())
            .timeout(timeout_duration)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|error| map_transport_error(error, timeout_duration))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|error| map_transport_error(error, timeout_duration))?;
        if !status.is_success() {
            return Err(SummarizerError::HttpStatus {
                status: status.as_u16(),
                body: raw,
            });
        }
        parse_messages_summary(&raw)
    }
}

fn map_transport_error(error: reqwest::Error, timeout_duration: Duration) -> SummarizerError {
    if error.is_timeout() {
        return SummarizerError::Timeout {
            timeout_ms: duration_ms(timeout_duration),
        };
    }
    SummarizerError::Http(error)
}

fn parse_messages_summary(raw: &str) -> Result<String, SummarizerError> {
    let payload = serde_json::from_str::<Value>(raw).map_err(|error| {
        SummarizerError::InvalidResponse(format!("messages response is not json: {error}"))
    })?;
    let Some(content) = payload.get("content").and_then(Value::as_array) else {
        return Err(SummarizerError::InvalidResponse(
            "messages response has no content array".to_string(),
        ));
    };
    let text = content
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");
    let text = text.trim();
    if text.is_empty() {
        return Err(SummarizerError::EmptyResponse);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::{parse_messages_summary, AnthropicSummarizer, AnthropicSummarizerConfig};
    use crate::SummarizerError;

    #[test]
    fn unit_parse_messages_summary_joins_text_blocks() {
        let raw = r#"{"content":[{"type":"text","text":"- a [ref=e1]"},{"type":"tool_use","id":"x"},{"type":"text","text":"- b [ref=e2]\n"}]}"#;
        assert_eq!(
            parse_messages_summary(raw).expect("summary"),
            "- a [ref=e1]\n- b [ref=e2]"
        );
    }

    #[test]
    fn regression_parse_messages_summary_rejects_missing_text() {
        let error = parse_messages_summary(r#"{"content":[]}"#).expect_err("empty");
        assert!(matches!(error, SummarizerError::EmptyResponse));
        let error = parse_messages_summary(r#"{"type":"error"}"#).expect_err("no content");
        assert!(matches!(error, SummarizerError::InvalidResponse(_)));
        let error = parse_messages_summary("<html>").expect_err("not json");
        assert!(matches!(error, SummarizerError::InvalidResponse(_)));
    }

    #[test]
    fn unit_anthropic_summarizer_requires_api_key() {
        let error = AnthropicSummarizer::new(AnthropicSummarizerConfig::default())
            .expect_err("missing key");
        assert!(matches!(error, SummarizerError::InvalidConfig(_)));
    }

    #[test]
    fn unit_messages_url_accepts_base_or_full_endpoint() {
        let summarizer = AnthropicSummarizer::new(AnthropicSummarizerConfig {
            api_base: "http://127.0.0.1:1/v1/".to_string(),
            api_key: "key".to_string(),
            ..AnthropicSummarizerConfig::default()
        })
        .expect("summarizer");
        assert_eq!(summarizer.messages_url(), "http://127.0.0.1:1/v1/messages");

        let summarizer = AnthropicSummarizer::new(AnthropicSummarizerConfig {
            api_base: "http://127.0.0.1:1/v1/messages".to_string(),
            api_key: "key".to_string(),
            ..AnthropicSummarizerConfig::default()
        })
        .expect("summarizer");
        assert_eq!(summarizer.messages_url(), "http://127.0.0.1:1/v1/messages");
    }
}
