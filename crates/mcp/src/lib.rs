//! MCP (Model Context Protocol) client library.
//!
//! This crate drives tool servers over stdio: it spawns the server process,
//! performs the `initialize` handshake, lists the server's tools and invokes
//! them.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{ProviderConfig, StdioProvider};
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = ProviderConfig {
//!     name: "filesystem".to_string(),
//!     command: "mcp-server-filesystem".to_string(),
//!     args: vec!["./workspace".to_string()],
//!     ..Default::default()
//! };
//!
//! let mut provider = StdioProvider::new(config);
//! for tool in provider.connect().await? {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let result = provider.call_tool("read_file", Some(serde_json::json!({
//!     "path": "./README.md"
//! }))).await?;
//! println!("{:?}", result.content);
//!
//! provider.close().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod protocol;
mod provider;

pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    ListToolsResult, PROTOCOL_VERSION, RequestId, ServerCapabilities, ServerInfo, Tool,
    ToolContent,
};
pub use provider::{MAX_OUTPUT_SIZE, ProviderConfig, ProviderState, StdioProvider};
