//! Tool providers, the tool registry and argument parsing.

pub mod args;
mod mcp_host;
mod provider;
mod registry;

pub use mcp_host::{McpLauncher, McpProvider};
pub use provider::{LaunchSpec, Launcher, ToolProvider};
pub use registry::{ProviderId, RegisteredTool, ToolRegistry};
