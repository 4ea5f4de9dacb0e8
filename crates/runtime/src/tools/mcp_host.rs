//! MCP-backed tool providers.

use std::collections::HashMap;

use mcp::{ProviderConfig, StdioProvider, ToolContent};
use serde_json::Value;
use tracing::debug;

use super::{LaunchSpec, Launcher, ToolProvider};
use crate::model::ToolSpec;
use crate::{Error, Result};

/// Launches tool servers as stdio child processes.
#[derive(Debug, Clone, Default)]
pub struct McpLauncher {
    env: HashMap<String, String>,
}

impl McpLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extra environment passed to every launched server.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

impl Launcher for McpLauncher {
    type Provider = McpProvider;

    async fn launch(&self, spec: &LaunchSpec) -> Result<McpProvider> {
        let config = ProviderConfig {
            name: spec.command.clone(),
            command: spec.command.clone(),
            args: spec.args.clone(),
            cwd: Some(spec.cwd.clone()),
            env: self.env.clone(),
        };

        let mut inner = StdioProvider::new(config);
        inner.connect().await.map_err(|e| Error::ConnectFailed {
            command: spec.command.clone(),
            reason: e.to_string(),
        })?;

        Ok(McpProvider { inner })
    }
}

/// A tool server connected over stdio.
pub struct McpProvider {
    inner: StdioProvider,
}

impl ToolProvider for McpProvider {
    async fn list_tools(&mut self) -> Result<Vec<ToolSpec>> {
        // The handshake already fetched the list.
        Ok(self
            .inner
            .tools()
            .iter()
            .cloned()
            .map(ToolSpec::from)
            .collect())
    }

    async fn call_tool(&mut self, name: &str, args: Value) -> Result<Vec<ToolContent>> {
        let arguments = match args {
            Value::Null => None,
            other => Some(other),
        };
        debug!(provider = %self.inner.name(), tool = name, "calling tool");

        let result = self
            .inner
            .call_tool(name, arguments)
            .await
            .map_err(|e| match e {
                mcp::Error::Closed => Error::ProviderClosed,
                mcp::Error::ToolCallFailed(message) => Error::ToolInvocation {
                    name: name.to_string(),
                    message,
                },
                other => Error::ToolInvocation {
                    name: name.to_string(),
                    message: other.to_string(),
                },
            })?;

        Ok(result.content)
    }

    async fn close(mut self) -> Result<()> {
        self.inner.close().await.map_err(|_| Error::ProviderClosed)
    }
}
