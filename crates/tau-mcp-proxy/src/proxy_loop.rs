use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::correlation::CorrelationTable;
use crate::envelope::{
    encode_line, jsonrpc_error_frame, McpMessage, MessageKind, JSONRPC_ERROR_INTERNAL,
    JSONRPC_ERROR_INVALID_REQUEST,
};
use crate::response_rewriter::ToolResponseRewriter;
use crate::tool_alias::ToolAliasTable;

pub const CLIENT_WRITER_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Outcome of one client line.
pub enum ClientLineAction {
    /// Send these bytes to the upstream process.
    Forward(Vec<u8>),
    /// Answer the client directly; nothing reaches the upstream process.
    Reply(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDisposition {
    Passthrough,
    Rewritten,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedLine {
    pub bytes: Vec<u8>,
    pub disposition: LineDisposition,
}

impl ProcessedLine {
    fn passthrough(line: &[u8]) -> Self {
        Self {
            bytes: line.to_vec(),
            disposition: LineDisposition::Passthrough,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// Per-direction line counters.
pub struct ProxyStreamReport {
    pub lines: usize,
    pub rewritten: usize,
    pub passthrough: usize,
    pub errors: usize,
}

impl ProxyStreamReport {
    fn count(&mut self, disposition: LineDisposition) {
        self.lines = self.lines.saturating_add(1);
        match disposition {
            LineDisposition::Passthrough => self.passthrough = self.passthrough.saturating_add(1),
            LineDisposition::Rewritten => self.rewritten = self.rewritten.saturating_add(1),
            LineDisposition::Error => self.errors = self.errors.saturating_add(1),
        }
    }
}

/// Protocol state shared by both stream directions of one upstream process.
pub struct McpProxy {
    correlation: CorrelationTable,
    aliases: ToolAliasTable,
    rewriter: ToolResponseRewriter,
}

impl McpProxy {
    pub fn new(aliases: ToolAliasTable, rewriter: ToolResponseRewriter) -> Self {
        Self {
            correlation: CorrelationTable::new(),
            aliases,
            rewriter,
        }
    }

    pub fn pending_calls(&self) -> usize {
        self.correlation.len()
    }

    /// Handle one line read from the client. Never waits on summarization.
    pub fn handle_client_line(&self, line: &[u8]) -> ClientLineAction {
        let Some(mut message) = McpMessage::parse(line) else {
            debug!(bytes = line.len(), "forwarding unparsed client line");
            return ClientLineAction::Forward(line.to_vec());
        };
        let Some(tool_name) = message.tool_call_name().map(str::to_string) else {
            return ClientLineAction::Forward(line.to_vec());
        };

        if let (MessageKind::Request, Some(id)) = (message.kind(), message.request_id()) {
            if let Err(error) = self.correlation.record(id, tool_name.clone()) {
                warn!(tool_name = %tool_name, error = %error, "rejecting tools/call with pending id");
                let id = message.id().cloned().unwrap_or(Value::Null);
                let frame = jsonrpc_error_frame(id, JSONRPC_ERROR_INVALID_REQUEST, error.to_string());
                return match encode_line(&frame) {
                    Ok(bytes) => ClientLineAction::Reply(bytes),
                    Err(encode_error) => {
                        error!(error = %encode_error, "failed to encode duplicate id error");
                        ClientLineAction::Forward(line.to_vec())
                    }
                };
            }
        }

        let Some(target) = message
            .params_mut()
            .and_then(|params| self.aliases.rewrite_call_params(params))
        else {
            return ClientLineAction::Forward(line.to_vec());
        };
        debug!(alias = %tool_name, target = %target, "rewrote aliased tools/call");
        match message.to_line() {
            Ok(bytes) => ClientLineAction::Forward(bytes),
            Err(encode_error) => {
                error!(error = %encode_error, "failed to encode aliased tools/call");
                ClientLineAction::Forward(line.to_vec())
            }
        }
    }

    /// Handle one line read from the upstream process.
    pub async fn handle_upstream_line(&self, line: &[u8]) -> ProcessedLine {
        let Some(mut message) = McpMessage::parse(line) else {
            debug!(bytes = line.len(), "forwarding unparsed upstream line");
            return ProcessedLine::passthrough(line);
        };
        if message.kind() != MessageKind::Response {
            return ProcessedLine::passthrough(line);
        }
        let Some(id) = message.request_id() else {
            return ProcessedLine::passthrough(line);
        };

        let Some(tool_name) = self.correlation.take(&id) else {
            return self.inject_aliases(message, line);
        };
        if message.is_error() {
            debug!(%id, tool_name = %tool_name, "tools/call error response forwarded");
            return ProcessedLine::passthrough(line);
        }
        let Some(result) = message.result() else {
            return ProcessedLine::passthrough(line);
        };

        match self.rewriter.rewrite_result(&tool_name, result).await {
            Ok(None) => ProcessedLine::passthrough(line),
            Ok(Some(rewritten)) => {
                message.set_result(rewritten);
                match message.to_line() {
                    Ok(bytes) => {
                        debug!(%id, tool_name = %tool_name, "tools/call result compacted");
                        ProcessedLine {
                            bytes,
                            disposition: LineDisposition::Rewritten,
                        }
                    }
                    Err(encode_error) => {
                        error!(%id, error = %encode_error, "failed to encode compacted result");
                        ProcessedLine::passthrough(line)
                    }
                }
            }
            Err(rewrite_error) => {
                error!(%id, tool_name = %tool_name, error = %rewrite_error, "tools/call result rewrite failed");
                let id = message.id().cloned().unwrap_or(Value::Null);
                let frame =
                    jsonrpc_error_frame(id, JSONRPC_ERROR_INTERNAL, rewrite_error.to_string());
                match encode_line(&frame) {
                    Ok(bytes) => ProcessedLine {
                        bytes,
                        disposition: LineDisposition::Error,
                    },
                    Err(encode_error) => {
                        error!(error = %encode_error, "failed to encode rewrite error response");
                        ProcessedLine::passthrough(line)
                    }
                }
            }
        }
    }

    fn inject_aliases(&self, mut message: McpMessage, line: &[u8]) -> ProcessedLine {
        let injected = message
            .result_mut()
            .map(|result| self.aliases.inject_alias_descriptors(result))
            .unwrap_or_default();
        if injected == 0 {
            if message.result().and_then(|result| result.get("tools")).is_none() {
                debug!(id = ?message.id(), "response without pending tools/call forwarded");
            }
            return ProcessedLine::passthrough(line);
        }
        match message.to_line() {
            Ok(bytes) => {
                debug!(injected, "added alias entries to tool listing");
                ProcessedLine {
                    bytes,
                    disposition: LineDisposition::Rewritten,
                }
            }
            Err(encode_error) => {
                error!(error = %encode_error, "failed to encode tool listing");
                ProcessedLine::passthrough(line)
            }
        }
    }
}

/// Copy client lines to the upstream process until the client closes its side.
/// Direct replies go to the ordered client writer. The upstream writer is shut
/// down on return.
pub async fn pump_client_to_upstream<R, W>(
    proxy: &McpProxy,
    mut client: R,
    mut upstream: W,
    client_tx: mpsc::Sender<Vec<u8>>,
) -> Result<ProxyStreamReport>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut report = ProxyStreamReport::default();
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = client
            .read_until(b'\n', &mut line)
            .await
            .context("failed to read client line")?;
        if read == 0 {
            break;
        }
        match proxy.handle_client_line(&line) {
            ClientLineAction::Forward(bytes) => {
                let disposition = if bytes == line {
                    LineDisposition::Passthrough
                } else {
                    LineDisposition::Rewritten
                };
                upstream
                    .write_all(&bytes)
                    .await
                    .context("failed to write upstream line")?;
                upstream
                    .flush()
                    .await
                    .context("failed to flush upstream line")?;
                report.count(disposition);
            }
            ClientLineAction::Reply(bytes) => {
                report.count(LineDisposition::Error);
                if client_tx.send(bytes).await.is_err() {
                    warn!("client writer closed; dropping direct reply");
                    break;
                }
            }
        }
    }
    upstream
        .shutdown()
        .await
        .context("failed to close upstream input")?;
    Ok(report)
}

/// Process upstream lines one at a time, in arrival order, and queue the
/// results for the client writer.
pub async fn pump_upstream_to_client<R>(
    proxy: &McpProxy,
    mut upstream: R,
    client_tx: mpsc::Sender<Vec<u8>>,
) -> Result<ProxyStreamReport>
where
    R: AsyncBufRead + Unpin,
{
    let mut report = ProxyStreamReport::default();
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = upstream
            .read_until(b'\n', &mut line)
            .await
            .context("failed to read upstream line")?;
        if read == 0 {
            break;
        }
        let processed = proxy.handle_upstream_line(&line).await;
        report.count(processed.disposition);
        if client_tx.send(processed.bytes).await.is_err() {
            warn!("client writer closed; stopping upstream reader");
            break;
        }
    }
    Ok(report)
}

/// Single writer for everything the client receives. Runs until every sender
/// is dropped, and returns the number of lines written.
pub async fn run_client_writer<W>(mut lines: mpsc::Receiver<Vec<u8>>, mut client: W) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0usize;
    while let Some(bytes) = lines.recv().await {
        client
            .write_all(&bytes)
            .await
            .context("failed to write client line")?;
        client.flush().await.context("failed to flush client line")?;
        written = written.saturating_add(1);
    }
    Ok(written)
}
