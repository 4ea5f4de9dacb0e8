//! Tool provider traits.

use crate::Result;
use crate::model::ToolSpec;
use mcp::ToolContent;
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;

/// How to start a tool server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub cwd: PathBuf,
    pub command: String,
    pub args: Vec<String>,
}

/// A connected source of tools.
///
/// This is the boundary between the agent loop and tool side effects.
pub trait ToolProvider: Send {
    /// Fetch the provider's tool list.
    fn list_tools(&mut self) -> impl Future<Output = Result<Vec<ToolSpec>>> + Send;

    /// Invoke a tool with structured arguments.
    fn call_tool(
        &mut self,
        name: &str,
        args: Value,
    ) -> impl Future<Output = Result<Vec<ToolContent>>> + Send;

    /// Tear the provider down. Consuming `self` makes a second close impossible.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// Starts providers and completes their handshake.
pub trait Launcher: Send + Sync {
    type Provider: ToolProvider;

    fn launch(&self, spec: &LaunchSpec) -> impl Future<Output = Result<Self::Provider>> + Send;
}
