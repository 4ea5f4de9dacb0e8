use std::time::Duration;

use thiserror::Error;

use crate::model::ModelError;

/// Runtime errors.
///
/// Everything except `Io` and `UnexpectedResume` is recoverable: it is
/// reported to the user and the session continues.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Launching a provider or completing its handshake failed.
    #[error("failed to connect to `{command}`: {reason}")]
    ConnectFailed { command: String, reason: String },

    /// A tool with this name is already registered.
    #[error("tool name collision: `{0}` is already registered")]
    DuplicateToolName(String),

    #[error("tool `{0}` not found")]
    ToolNotFound(String),

    #[error("no provider currently exposes tool `{0}`")]
    NoProviderForTool(String),

    /// The provider reported an error for a tool call.
    #[error("tool `{name}` failed: {message}")]
    ToolInvocation { name: String, message: String },

    /// A single `key[:number]=value` argument could not be parsed.
    #[error("invalid argument `{arg}`: {reason}")]
    ArgumentParse { arg: String, reason: String },

    #[error("model kept requesting tools after {0} rounds")]
    TooManyToolRounds(usize),

    #[error("provider is closed")]
    ProviderClosed,

    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },

    #[error(transparent)]
    Model(#[from] ModelError),

    /// The driver resumed the interpreter with a value for a different effect.
    #[error("interpreter expected {expected}, got {got}")]
    UnexpectedResume {
        expected: &'static str,
        got: &'static str,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
