//! LLM protocol types and backend trait.

pub mod errors;
pub mod types;

pub use errors::ModelError;
pub use types::{
    Backend, ContentBlock, ModelRequest, ModelResponse, ToolResult, ToolSpec, ToolUse, Turn,
    Usage,
};
