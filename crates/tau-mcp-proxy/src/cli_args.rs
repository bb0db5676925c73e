use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::tool_alias::parse_tool_alias_mapping;
use crate::{CliLogLevel, CliSummarizerBackend, CliSummarizerFailureMode};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u32(value: &str) -> Result<u32, String> {
    let parsed = value
        .parse::<u32>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_tool_alias_arg(value: &str) -> Result<(String, String), String> {
    parse_tool_alias_mapping(value).map_err(|error| error.to_string())
}

#[derive(Debug, Parser)]
#[command(
    name = "tau-mcp-proxy",
    about = "Line-delimited MCP stdio proxy that compacts browser page snapshots",
    version
)]
/// Public struct `Cli` used across Tau components.
pub struct Cli {
    #[arg(
        long = "summary-threshold-chars",
        env = "TAU_MCP_PROXY_SUMMARY_THRESHOLD_CHARS",
        default_value_t = tau_summarizer::DEFAULT_SUMMARY_THRESHOLD_CHARS,
        value_parser = parse_positive_usize,
        help = "Page snapshots with at least this many characters are replaced by a summary."
    )]
    pub summary_threshold_chars: usize,

    #[arg(
        long = "summarizer-timeout-ms",
        env = "TAU_MCP_PROXY_SUMMARIZER_TIMEOUT_MS",
        default_value_t = tau_summarizer::DEFAULT_SUMMARIZER_TIMEOUT_MS,
        value_parser = parse_positive_u64,
        help = "Upper bound for one summarizer call."
    )]
    pub summarizer_timeout_ms: u64,

    #[arg(
        long = "summarizer",
        env = "TAU_MCP_PROXY_SUMMARIZER",
        value_enum,
        default_value = "anthropic",
        help = "Summarizer backend: anthropic (Messages API), command (local program), or none."
    )]
    pub summarizer: CliSummarizerBackend,

    #[arg(
        long = "summarizer-command",
        env = "TAU_MCP_PROXY_SUMMARIZER_COMMAND",
        help = "Command line for --summarizer command. The prompt is written to its stdin and the summary read from its stdout."
    )]
    pub summarizer_command: Option<String>,

    #[arg(
        long = "summarizer-model",
        env = "TAU_MCP_PROXY_SUMMARIZER_MODEL",
        default_value = tau_summarizer::DEFAULT_ANTHROPIC_SUMMARY_MODEL,
        help = "Model used by the anthropic summarizer."
    )]
    pub summarizer_model: String,

    #[arg(
        long = "summarizer-api-base",
        env = "TAU_MCP_PROXY_SUMMARIZER_API_BASE",
        default_value = tau_summarizer::DEFAULT_ANTHROPIC_API_BASE,
        help = "Base URL of the Anthropic API."
    )]
    pub summarizer_api_base: String,

    #[arg(
        long = "summarizer-api-key",
        env = "TAU_MCP_PROXY_SUMMARIZER_API_KEY",
        hide_env_values = true,
        help = "API key for the anthropic summarizer. Falls back to ANTHROPIC_API_KEY."
    )]
    pub summarizer_api_key: Option<String>,

    #[arg(
        long = "summarizer-max-tokens",
        env = "TAU_MCP_PROXY_SUMMARIZER_MAX_TOKENS",
        default_value_t = tau_summarizer::DEFAULT_ANTHROPIC_SUMMARY_MAX_TOKENS,
        value_parser = parse_positive_u32,
        help = "Maximum summary tokens requested from the anthropic summarizer."
    )]
    pub summarizer_max_tokens: u32,

    #[arg(
        long = "on-summarizer-failure",
        env = "TAU_MCP_PROXY_ON_SUMMARIZER_FAILURE",
        value_enum,
        default_value = "error",
        help = "error: answer the tool call with a JSON-RPC error. passthrough: forward the original snapshot."
    )]
    pub on_summarizer_failure: CliSummarizerFailureMode,

    #[arg(
        long = "tool-alias",
        env = "TAU_MCP_PROXY_TOOL_ALIASES",
        value_delimiter = ',',
        value_parser = parse_tool_alias_arg,
        action = ArgAction::Append,
        help = "Extra public tool name in ALIAS=TARGET form. Alias responses are never summarized."
    )]
    pub tool_alias: Vec<(String, String)>,

    #[arg(
        long = "no-default-aliases",
        env = "TAU_MCP_PROXY_NO_DEFAULT_ALIASES",
        default_value_t = false,
        help = "Do not register browser_snapshot_full=browser_snapshot."
    )]
    pub no_default_aliases: bool,

    #[arg(
        long = "skip-tool",
        env = "TAU_MCP_PROXY_SKIP_TOOLS",
        value_delimiter = ',',
        action = ArgAction::Append,
        help = "Tool whose responses are forwarded without summarization."
    )]
    pub skip_tool: Vec<String>,

    #[arg(
        long = "log-file",
        env = "TAU_MCP_PROXY_LOG_FILE",
        help = "Write logs to this file (size-rotated) instead of stderr."
    )]
    pub log_file: Option<PathBuf>,

    #[arg(
        long = "log-level",
        env = "TAU_MCP_PROXY_LOG_LEVEL",
        value_enum,
        default_value = "warn",
        help = "Default log level; RUST_LOG overrides it."
    )]
    pub log_level: CliLogLevel,

    #[arg(
        last = true,
        required = true,
        value_name = "UPSTREAM",
        help = "Upstream MCP server command and arguments, after `--`."
    )]
    pub upstream: Vec<String>,
}
