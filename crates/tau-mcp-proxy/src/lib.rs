//! Line-delimited JSON-RPC stdio proxy for MCP servers.
//!
//! Sits between an MCP client and an upstream server process (typically the
//! Playwright MCP server). Tool call results carrying a large page snapshot
//! are summarized, repeated browser event lines are collapsed, and alias tool
//! names give access to the uncompressed output.

mod bootstrap_helpers;
mod cli_args;
mod cli_types;
pub mod correlation;
pub mod envelope;
pub mod log_file;
pub mod proxy_loop;
pub mod response_rewriter;
pub mod startup;
pub mod tool_alias;
pub mod upstream;

pub use bootstrap_helpers::init_tracing;
pub use cli_args::Cli;
pub use cli_types::{CliLogLevel, CliSummarizerBackend, CliSummarizerFailureMode};
pub use correlation::{CorrelationError, CorrelationTable};
pub use envelope::{McpMessage, MessageKind, RequestId};
pub use proxy_loop::{
    pump_client_to_upstream, pump_upstream_to_client, run_client_writer, ClientLineAction,
    LineDisposition, McpProxy, ProcessedLine, ProxyStreamReport,
};
pub use response_rewriter::{RewriteError, ToolResponseRewriter};
pub use startup::{
    build_proxy, build_runtime_config, build_snapshot_compactor, run_cli, session_timeouts,
    ProxyRuntimeConfig, SummarizerBackendConfig,
};
pub use tool_alias::{parse_tool_alias_mapping, SkipSet, ToolAliasError, ToolAliasTable};
pub use upstream::{
    run_proxy_session, shutdown_signal, ProxySessionReport, SessionEnd, SessionTimeouts,
    UpstreamCommand, DEFAULT_UPSTREAM_DRAIN_TIMEOUT, DEFAULT_UPSTREAM_EXIT_GRACE,
};
