use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::proxy_loop::{
    pump_client_to_upstream, pump_upstream_to_client, run_client_writer, McpProxy,
    ProxyStreamReport, CLIENT_WRITER_CHANNEL_CAPACITY,
};

pub const DEFAULT_UPSTREAM_EXIT_GRACE: Duration = Duration::from_secs(5);
pub const DEFAULT_UPSTREAM_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const UNKNOWN_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Program and arguments of the wrapped MCP server.
pub struct UpstreamCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl UpstreamCommand {
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let Some((program, args)) = argv.split_first() else {
            bail!("missing upstream command; pass it after `--`");
        };
        if program.trim().is_empty() {
            bail!("upstream command cannot be empty");
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn spawn(&self) -> Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn upstream command '{}'", self.program))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Time limits applied while a session shuts down.
pub struct SessionTimeouts {
    /// How long the upstream may keep running after its input is closed.
    pub exit_grace: Duration,
    /// How long upstream output may still be processed once the upstream
    /// has exited.
    pub drain: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            exit_grace: DEFAULT_UPSTREAM_EXIT_GRACE,
            drain: DEFAULT_UPSTREAM_DRAIN_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What ended a proxy session.
pub enum SessionEnd {
    UpstreamExited,
    ClientClosed,
    Signal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Public struct `ProxySessionReport` used across Tau components.
pub struct ProxySessionReport {
    pub end: SessionEnd,
    pub exit_code: i32,
    pub client: ProxyStreamReport,
    pub upstream: ProxyStreamReport,
    pub client_lines_written: usize,
}

/// Spawn the upstream process and proxy between it and the client streams
/// until the upstream exits, the client closes its input, or `shutdown`
/// resolves.
pub async fn run_proxy_session<R, W, S>(
    proxy: Arc<McpProxy>,
    upstream: &UpstreamCommand,
    client_reader: R,
    client_writer: W,
    shutdown: S,
    timeouts: SessionTimeouts,
) -> Result<ProxySessionReport>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    S: Future<Output = ()>,
{
    let mut child = upstream.spawn()?;
    info!(program = %upstream.program, pid = ?child.id(), "upstream process started");
    let child_stdin = child.stdin.take().context("upstream stdin unavailable")?;
    let child_stdout = child.stdout.take().context("upstream stdout unavailable")?;

    let (client_tx, client_rx) = mpsc::channel(CLIENT_WRITER_CHANNEL_CAPACITY);
    let writer = tokio::spawn(run_client_writer(client_rx, client_writer));
    let mut client_pump = {
        let proxy = proxy.clone();
        let client_tx = client_tx.clone();
        tokio::spawn(async move {
            pump_client_to_upstream(&proxy, client_reader, child_stdin, client_tx).await
        })
    };
    let mut upstream_pump = tokio::spawn(async move {
        pump_upstream_to_client(&proxy, BufReader::new(child_stdout), client_tx).await
    });

    tokio::pin!(shutdown);
    let mut client_report = None;
    let (end, status) = tokio::select! {
        status = child.wait() => {
            let status = status.context("failed to wait for upstream process")?;
            info!(%status, "upstream process exited");
            (SessionEnd::UpstreamExited, Some(status))
        }
        joined = &mut client_pump => {
            client_report = Some(stream_report("client", joined));
            info!("client input closed; waiting for upstream process");
            (SessionEnd::ClientClosed, wait_with_grace(&mut child, timeouts.exit_grace).await)
        }
        _ = &mut shutdown => {
            info!("termination requested; stopping upstream process");
            // Dropping the pump closes the upstream input.
            client_pump.abort();
            (SessionEnd::Signal, terminate_with_grace(&mut child, timeouts.exit_grace).await)
        }
    };

    let client_report = match client_report {
        Some(report) => report,
        None => {
            client_pump.abort();
            stream_report("client", client_pump.await)
        }
    };
    let upstream_report = match timeout(timeouts.drain, &mut upstream_pump).await {
        Ok(joined) => stream_report("upstream", joined),
        Err(_) => {
            warn!("upstream output did not close after exit; abandoning reader");
            upstream_pump.abort();
            ProxyStreamReport::default()
        }
    };
    let client_lines_written = match writer.await {
        Ok(Ok(written)) => written,
        Ok(Err(error)) => {
            warn!(error = %error, "client writer stopped early");
            0
        }
        Err(error) => {
            warn!(error = %error, "client writer task failed");
            0
        }
    };

    let exit_code = status
        .and_then(|status| status.code())
        .unwrap_or(UNKNOWN_EXIT_CODE);
    let report = ProxySessionReport {
        end,
        exit_code,
        client: client_report,
        upstream: upstream_report,
        client_lines_written,
    };
    info!(
        end = ?report.end,
        exit_code,
        client_lines = report.client.lines,
        client_rewritten = report.client.rewritten,
        client_errors = report.client.errors,
        upstream_lines = report.upstream.lines,
        upstream_rewritten = report.upstream.rewritten,
        upstream_passthrough = report.upstream.passthrough,
        upstream_errors = report.upstream.errors,
        client_lines_written,
        "proxy session finished"
    );
    Ok(report)
}

fn stream_report(
    direction: &'static str,
    joined: Result<Result<ProxyStreamReport>, tokio::task::JoinError>,
) -> ProxyStreamReport {
    match joined {
        Ok(Ok(report)) => report,
        Ok(Err(error)) => {
            warn!(direction, error = %error, "proxy stream stopped with error");
            ProxyStreamReport::default()
        }
        Err(error) if error.is_cancelled() => {
            debug!(direction, "proxy stream cancelled");
            ProxyStreamReport::default()
        }
        Err(error) => {
            warn!(direction, error = %error, "proxy stream task failed");
            ProxyStreamReport::default()
        }
    }
}

async fn wait_with_grace(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            info!(%status, "upstream process exited after input closed");
            Some(status)
        }
        Ok(Err(error)) => {
            warn!(error = %error, "failed to wait for upstream process");
            None
        }
        Err(_) => {
            warn!(
                grace_ms = duration_ms(grace),
                "upstream process did not exit after input closed; killing"
            );
            kill_and_reap(child).await
        }
    }
}

/// Forward SIGTERM to the upstream and kill it once `grace` runs out.
async fn terminate_with_grace(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    send_terminate(child);
    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            info!(%status, "upstream process exited after termination request");
            Some(status)
        }
        Ok(Err(error)) => {
            warn!(error = %error, "failed to wait for upstream process");
            None
        }
        Err(_) => {
            warn!(
                grace_ms = duration_ms(grace),
                "upstream process ignored termination request; killing"
            );
            kill_and_reap(child).await
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        debug!("upstream process already reaped; nothing to signal");
        return;
    };
    if let Err(error) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        warn!(pid, error = %error, "failed to send SIGTERM to upstream process");
    }
}

#[cfg(not(unix))]
fn send_terminate(_child: &Child) {}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}

async fn kill_and_reap(child: &mut Child) -> Option<ExitStatus> {
    if let Err(error) = child.kill().await {
        debug!(error = %error, "upstream process already exited");
    }
    child.wait().await.ok()
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(error) => {
                warn!(error = %error, "failed to install SIGTERM handler");
                ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
