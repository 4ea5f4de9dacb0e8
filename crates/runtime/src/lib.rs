//! Tether runtime: the interactive tool-using agent session.
//!
//! The runtime is organized around these concepts:
//!
//! - **Interpreter**: a pure state machine that turns user input into
//!   [`Effect`]s and consumes their outcomes.
//! - **Driver**: owns the backend, the tool providers, the transcript and the
//!   console, and performs each effect.
//! - **Backend**: the model gateway ([`AnthropicBackend`]).
//! - **ToolProvider**: a connected tool server ([`McpProvider`]), addressed
//!   through the [`ToolRegistry`].
//!
//! # Example
//!
//! ```no_run
//! use runtime::{AnthropicAuth, AnthropicBackend, Driver, McpLauncher, StdConsole};
//!
//! # async fn example() -> runtime::Result<()> {
//! let backend = AnthropicBackend::builder(
//!     AnthropicAuth::ApiKey("sk-ant-...".into()),
//!     runtime::providers::DEFAULT_MODEL,
//! )
//! .build();
//! let driver = Driver::new(backend, McpLauncher::new(), StdConsole::new());
//! driver.run().await
//! # }
//! ```

mod console;
mod conversation;
mod driver;
mod error;
pub mod interpreter;
pub mod model;
pub mod providers;
mod shutdown;
pub mod tools;

pub use console::{Console, StdConsole};
pub use conversation::{Conversation, TranscriptOp};
pub use driver::{Driver, Settings};
pub use error::{Error, Result};
pub use interpreter::{Effect, Interpreter, Resume, Step};
pub use model::{Backend, ContentBlock, ModelError, ToolSpec, Turn};
pub use providers::{AnthropicAuth, AnthropicBackend, AnthropicBackendBuilder};
pub use shutdown::shutdown_signal;
pub use tools::{LaunchSpec, Launcher, McpLauncher, McpProvider, ToolProvider, ToolRegistry};
