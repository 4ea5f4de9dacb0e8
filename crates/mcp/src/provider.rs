//! Tool-server process management (spawn, handshake, lifecycle).

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, IncomingMessage, InitializeParams, InitializeResult,
    JsonRpcNotification, JsonRpcRequest, ListToolsParams, ListToolsResult, RequestId, Tool,
};

/// Maximum size of a single message line (1MB).
/// Sized for large tool outputs (file reads, search results).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// How long `close` waits for the server to exit after stdin is closed.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Configuration for a tool server process.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    /// Display name used in logs.
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    /// Working directory for the child; inherits ours when unset.
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

/// Lifecycle of a provider connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Disconnected,
    Connecting,
    Ready,
    /// Terminal.
    Closed,
}

impl ProviderState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Pipes {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// A tool server reached over the child's stdin/stdout.
pub struct StdioProvider {
    config: ProviderConfig,
    state: ProviderState,
    pipes: Option<Pipes>,
    next_id: i64,
    server_info: Option<InitializeResult>,
    tools: Vec<Tool>,
}

impl StdioProvider {
    /// Create a provider in the `Disconnected` state. Nothing is spawned yet.
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            state: ProviderState::Disconnected,
            pipes: None,
            next_id: 1,
            server_info: None,
            tools: Vec::new(),
        }
    }

    /// Get the provider name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> ProviderState {
        self.state
    }

    /// Server info (after the handshake).
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.as_ref()
    }

    /// Tools fetched during the handshake.
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Spawn the server, run the `initialize` handshake and fetch its tools.
    ///
    /// On any failure the child is killed and the provider ends up `Closed`.
    pub async fn connect(&mut self) -> Result<&[Tool]> {
        if self.state != ProviderState::Disconnected {
            return Err(Error::AlreadyStarted(self.state.as_str()));
        }

        self.state = ProviderState::Connecting;
        info!(provider = %self.config.name, command = %self.config.command, "connecting");

        match self.handshake().await {
            Ok(()) => {
                self.state = ProviderState::Ready;
                info!(provider = %self.config.name, tools = self.tools.len(), "ready");
                Ok(&self.tools)
            }
            Err(e) => {
                warn!(provider = %self.config.name, error = %e, "handshake failed");
                self.teardown().await;
                Err(e)
            }
        }
    }

    /// Call a tool by name.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<CallToolResult> {
        self.ensure_ready()?;

        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;
        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        if result.is_error {
            let error_text = result
                .content
                .iter()
                .filter_map(|c| c.as_text())
                .collect::<Vec<_>>()
                .join("\n");
            return Err(Error::ToolCallFailed(error_text));
        }

        Ok(result)
    }

    /// Shut the server down. Fails with [`Error::Closed`] if already closed.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == ProviderState::Closed {
            return Err(Error::Closed);
        }
        self.teardown().await;
        Ok(())
    }

    // --- Internal methods ---

    async fn handshake(&mut self) -> Result<()> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = &self.config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(Error::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdout")))?;

        self.pipes = Some(Pipes {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        });

        let params = serde_json::to_value(InitializeParams::default())?;
        let result: InitializeResult = self.request("initialize", Some(params)).await?;
        debug!(
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "initialized"
        );
        self.server_info = Some(result);

        self.notify("notifications/initialized").await?;

        self.tools = self.fetch_tools().await?;
        Ok(())
    }

    async fn fetch_tools(&mut self) -> Result<Vec<Tool>> {
        let mut tools = Vec::new();
        let mut cursor = None;

        loop {
            let params = serde_json::to_value(ListToolsParams { cursor })?;
            let page: ListToolsResult = self.request("tools/list", Some(params)).await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(tools),
            }
        }
    }

    async fn teardown(&mut self) {
        self.state = ProviderState::Closed;

        let Some(Pipes {
            mut child,
            stdin,
            stdout,
        }) = self.pipes.take()
        else {
            return;
        };

        // Closing stdin is the protocol's shutdown signal.
        drop(stdin);
        drop(stdout);

        match timeout(CLOSE_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(provider = %self.config.name, %status, "server exited"),
            _ => {
                if let Err(e) = child.kill().await {
                    warn!(provider = %self.config.name, error = %e, "failed to kill server");
                }
            }
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            ProviderState::Ready => Ok(()),
            ProviderState::Closed => Err(Error::Closed),
            other => Err(Error::NotReady(other.as_str())),
        }
    }

    fn next_request_id(&mut self) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        RequestId::Number(id)
    }

    async fn request<R>(&mut self, method: &str, params: Option<Value>) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        trace!(method, ?id, "request");
        self.write_line(&serde_json::to_string(&request)?).await?;

        let response = self.read_response(&id).await?;
        let value = response.into_result()?;
        serde_json::from_value(value)
            .map_err(|e| Error::InvalidResponse(format!("{method}: {e}")))
    }

    async fn notify(&mut self, method: &str) -> Result<()> {
        let notification = serde_json::to_string(&JsonRpcNotification::new(method))?;
        self.write_line(&notification).await
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let pipes = self.pipes.as_mut().ok_or(Error::Closed)?;
        pipes.stdin.write_all(line.as_bytes()).await?;
        pipes.stdin.write_all(b"\n").await?;
        pipes.stdin.flush().await?;
        Ok(())
    }

    async fn read_response(&mut self, id: &RequestId) -> Result<IncomingMessage> {
        let pipes = self.pipes.as_mut().ok_or(Error::Closed)?;

        let mut line = Vec::new();
        loop {
            line.clear();
            if read_line_bounded(&mut pipes.stdout, &mut line, MAX_OUTPUT_SIZE).await? == 0 {
                return Err(Error::ServerExited);
            }

            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }

            let message: IncomingMessage = match serde_json::from_slice(line) {
                Ok(message) => message,
                Err(e) => {
                    debug!(error = %e, "skipping non JSON-RPC output");
                    continue;
                }
            };

            if !message.is_response() {
                trace!(method = ?message.method, "skipping server-initiated message");
                continue;
            }
            if message.id.as_ref() != Some(id) {
                debug!(expected = ?id, got = ?message.id, "skipping stale response");
                continue;
            }

            return Ok(message);
        }
    }
}

/// Read one `\n`-terminated line into `line`, returning the bytes read
/// (0 at end of stream).
///
/// Fails with [`Error::OutputTooLarge`] as soon as the line exceeds `max`
/// bytes, without buffering the rest of it.
async fn read_line_bounded<R>(reader: &mut R, line: &mut Vec<u8>, max: usize) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut read = 0;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(read);
        }

        let (chunk, done) = match available.iter().position(|&b| b == b'\n') {
            Some(end) => (&available[..=end], true),
            None => (available, false),
        };
        let content = line.len() + chunk.len() - usize::from(done);
        if content > max {
            return Err(Error::OutputTooLarge { size: content, max });
        }

        line.extend_from_slice(chunk);
        let used = chunk.len();
        reader.consume(used);
        read += used;

        if done {
            return Ok(read);
        }
    }
}
