//! LLM provider adapters.
//!
//! Each provider implements the [`Backend`](crate::model::Backend) trait for
//! its specific API.

mod anthropic;

pub use anthropic::{
    AnthropicAuth, AnthropicBackend, AnthropicBackendBuilder, DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL,
};
