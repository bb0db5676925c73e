use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tau_summarizer::{
    AnthropicSummarizer, AnthropicSummarizerConfig, CommandSummarizer, SnapshotCompactor,
    SnapshotSummaryPolicy, Summarizer,
};
use tokio::io::BufReader;
use tracing::info;

use crate::proxy_loop::McpProxy;
use crate::response_rewriter::ToolResponseRewriter;
use crate::tool_alias::{SkipSet, ToolAliasTable};
use crate::upstream::{
    run_proxy_session, shutdown_signal, SessionTimeouts, UpstreamCommand,
    DEFAULT_UPSTREAM_DRAIN_TIMEOUT, DEFAULT_UPSTREAM_EXIT_GRACE,
};
use crate::{Cli, CliSummarizerBackend};

const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Clone)]
/// Enumerates supported `SummarizerBackendConfig` values.
pub enum SummarizerBackendConfig {
    Anthropic(AnthropicSummarizerConfig),
    Command { program: String, args: Vec<String> },
    Disabled,
}

#[derive(Debug, Clone)]
/// Validated proxy configuration, built before the upstream is spawned.
pub struct ProxyRuntimeConfig {
    pub upstream: UpstreamCommand,
    pub aliases: ToolAliasTable,
    pub skip: SkipSet,
    pub policy: SnapshotSummaryPolicy,
    pub summarizer: SummarizerBackendConfig,
}

pub fn build_runtime_config(cli: &Cli) -> Result<ProxyRuntimeConfig> {
    build_runtime_config_with_env(cli, |name| std::env::var(name).ok())
}

fn build_runtime_config_with_env(
    cli: &Cli,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ProxyRuntimeConfig> {
    let upstream = UpstreamCommand::from_argv(&cli.upstream)?;

    let mut aliases = if cli.no_default_aliases {
        ToolAliasTable::new()
    } else {
        ToolAliasTable::with_default_aliases()
    };
    for (alias, target) in &cli.tool_alias {
        aliases
            .insert(alias.clone(), target.clone())
            .with_context(|| format!("invalid --tool-alias {alias}={target}"))?;
    }
    let skip = SkipSet::new(cli.skip_tool.iter().map(|name| name.trim()), &aliases);

    let policy = SnapshotSummaryPolicy {
        threshold_chars: cli.summary_threshold_chars,
        timeout_ms: cli.summarizer_timeout_ms,
        failure_mode: cli.on_summarizer_failure.into(),
    };

    let summarizer = match cli.summarizer {
        CliSummarizerBackend::None => SummarizerBackendConfig::Disabled,
        CliSummarizerBackend::Command => {
            let Some(raw) = cli
                .summarizer_command
                .as_deref()
                .filter(|raw| !raw.trim().is_empty())
            else {
                bail!("--summarizer command requires --summarizer-command");
            };
            let mut words = shell_words::split(raw)
                .with_context(|| format!("failed to parse --summarizer-command '{raw}'"))?;
            if words.is_empty() {
                bail!("--summarizer-command cannot be empty");
            }
            let program = words.remove(0);
            SummarizerBackendConfig::Command {
                program,
                args: words,
            }
        }
        CliSummarizerBackend::Anthropic => {
            let api_key = cli
                .summarizer_api_key
                .clone()
                .or_else(|| env(ANTHROPIC_API_KEY_ENV))
                .filter(|key| !key.trim().is_empty());
            let Some(api_key) = api_key else {
                bail!(
                    "--summarizer anthropic requires --summarizer-api-key or {ANTHROPIC_API_KEY_ENV}; use --summarizer none to disable summarization"
                );
            };
            SummarizerBackendConfig::Anthropic(AnthropicSummarizerConfig {
                api_base: cli.summarizer_api_base.clone(),
                api_key,
                model: cli.summarizer_model.clone(),
                max_tokens: cli.summarizer_max_tokens,
            })
        }
    };

    Ok(ProxyRuntimeConfig {
        upstream,
        aliases,
        skip,
        policy,
        summarizer,
    })
}

pub fn build_snapshot_compactor(config: &ProxyRuntimeConfig) -> Result<SnapshotCompactor> {
    let summarizer: Arc<dyn Summarizer> = match &config.summarizer {
        SummarizerBackendConfig::Disabled => {
            return Ok(SnapshotCompactor::disabled(config.policy));
        }
        SummarizerBackendConfig::Command { program, args } => Arc::new(
            CommandSummarizer::new(program.clone(), args.clone())
                .context("invalid summarizer command")?,
        ),
        SummarizerBackendConfig::Anthropic(anthropic) => Arc::new(
            AnthropicSummarizer::new(anthropic.clone())
                .context("failed to configure anthropic summarizer")?,
        ),
    };
    Ok(SnapshotCompactor::new(summarizer, config.policy))
}

/// Output still buffered when the upstream exits may need one summarizer call.
pub fn session_timeouts(config: &ProxyRuntimeConfig) -> SessionTimeouts {
    SessionTimeouts {
        exit_grace: DEFAULT_UPSTREAM_EXIT_GRACE,
        drain: DEFAULT_UPSTREAM_DRAIN_TIMEOUT
            .saturating_add(Duration::from_millis(config.policy.timeout_ms)),
    }
}

pub fn build_proxy(config: &ProxyRuntimeConfig) -> Result<McpProxy> {
    let compactor = build_snapshot_compactor(config)?;
    let rewriter = ToolResponseRewriter::new(compactor, config.skip.clone());
    Ok(McpProxy::new(config.aliases.clone(), rewriter))
}

/// Run the proxy on the process stdio and return the upstream exit code.
pub async fn run_cli(cli: Cli) -> Result<i32> {
    let config = build_runtime_config(&cli)?;
    let proxy = Arc::new(build_proxy(&config)?);
    info!(
        program = %config.upstream.program,
        aliases = config.aliases.len(),
        skipped_tools = config.skip.len(),
        threshold_chars = config.policy.threshold_chars,
        summarizer = ?cli.summarizer,
        "starting mcp proxy"
    );

    let report = run_proxy_session(
        proxy,
        &config.upstream,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown_signal(),
        session_timeouts(&config),
    )
    .await?;
    Ok(report.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use tau_summarizer::SummarizerFailureMode;

    use super::{
        build_proxy, build_runtime_config_with_env, session_timeouts, SummarizerBackendConfig,
    };
    use crate::Cli;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["tau-mcp-proxy"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("parse")
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn unit_build_runtime_config_requires_anthropic_key_before_spawn() {
        let error = build_runtime_config_with_env(&cli(&["--", "upstream"]), no_env)
            .expect_err("missing key");
        assert!(error.to_string().contains("ANTHROPIC_API_KEY"));

        let config = build_runtime_config_with_env(&cli(&["--", "upstream"]), |name| {
            (name == "ANTHROPIC_API_KEY").then(|| "sk-test".to_string())
        })
        .expect("config");
        match config.summarizer {
            SummarizerBackendConfig::Anthropic(anthropic) => {
                assert_eq!(anthropic.api_key, "sk-test");
                assert_eq!(anthropic.model, "claude-3-5-haiku-latest");
            }
            other => panic!("unexpected backend: {other:?}"),
        }
    }

    #[test]
    fn functional_build_runtime_config_splits_summarizer_command() {
        let config = build_runtime_config_with_env(
            &cli(&[
                "--summarizer",
                "command",
                "--summarizer-command",
                "llm --system 'be brief'",
                "--on-summarizer-failure",
                "passthrough",
                "--",
                "upstream",
            ]),
            no_env,
        )
        .expect("config");
        match &config.summarizer {
            SummarizerBackendConfig::Command { program, args } => {
                assert_eq!(program, "llm");
                assert_eq!(args, &vec!["--system".to_string(), "be brief".to_string()]);
            }
            other => panic!("unexpected backend: {other:?}"),
        }
        assert_eq!(config.policy.failure_mode, SummarizerFailureMode::Passthrough);
        assert_eq!(session_timeouts(&config).drain.as_millis(), 65_000);
        assert!(build_proxy(&config).is_ok());
    }

    #[test]
    fn regression_build_runtime_config_rejects_missing_summarizer_command() {
        let error = build_runtime_config_with_env(
            &cli(&["--summarizer", "command", "--", "upstream"]),
            no_env,
        )
        .expect_err("missing command");
        assert!(error.to_string().contains("--summarizer-command"));
    }

    #[test]
    fn functional_build_runtime_config_merges_aliases_and_skip_set() {
        let config = build_runtime_config_with_env(
            &cli(&[
                "--summarizer",
                "none",
                "--tool-alias",
                "tabs_full=browser_tabs",
                "--skip-tool",
                "browser_take_screenshot",
                "--",
                "upstream",
            ]),
            no_env,
        )
        .expect("config");
        assert_eq!(config.aliases.resolve("browser_snapshot_full"), Some("browser_snapshot"));
        assert_eq!(config.aliases.resolve("tabs_full"), Some("browser_tabs"));
        assert!(config.skip.contains("tabs_full"));
        assert!(config.skip.contains("browser_snapshot_full"));
        assert!(config.skip.contains("browser_take_screenshot"));
        assert!(matches!(config.summarizer, SummarizerBackendConfig::Disabled));

        let config = build_runtime_config_with_env(
            &cli(&["--summarizer", "none", "--no-default-aliases", "--", "upstream"]),
            no_env,
        )
        .expect("config");
        assert!(config.aliases.is_empty());
        assert!(config.skip.is_empty());
    }

    #[test]
    fn regression_build_runtime_config_rejects_conflicting_alias() {
        let error = build_runtime_config_with_env(
            &cli(&[
                "--summarizer",
                "none",
                "--tool-alias",
                "browser_snapshot_full=browser_click",
                "--",
                "upstream",
            ]),
            no_env,
        )
        .expect_err("conflict");
        assert!(error.to_string().contains("--tool-alias"));
    }
}
