//! MCP error types.

use crate::protocol::JsonRpcError;
use thiserror::Error;

/// Errors raised while talking to a tool server.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to spawn server: {0}")]
    Spawn(std::io::Error),

    /// `connect` was called on a provider that already left `Disconnected`.
    #[error("provider already started (state: {0})")]
    AlreadyStarted(&'static str),

    /// The provider has not finished its handshake yet.
    #[error("provider is not ready (state: {0})")]
    NotReady(&'static str),

    /// The provider was closed; it cannot be used again.
    #[error("provider is closed")]
    Closed,

    #[error("server exited unexpectedly")]
    ServerExited,

    #[error("stdio error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    /// The server answered the call but flagged the result as an error.
    #[error("tool call failed: {0}")]
    ToolCallFailed(String),

    #[error("output too large: {size} bytes (max {max})")]
    OutputTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
