//! Effects the interpreter asks for, and the values it is resumed with.

use mcp::ToolContent;
use serde_json::Value;

use crate::Result;
use crate::conversation::TranscriptOp;
use crate::model::{ContentBlock, ToolSpec};
use crate::tools::{LaunchSpec, ProviderId};

/// A side effect for the driver to perform.
///
/// Each variant names the [`Resume`] value it must be answered with.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Read one line of input. Answer: [`Resume::Line`].
    Read { prompt: String },
    /// Show text to the user. Answer: [`Resume::Done`].
    Print(String),
    /// Change the transcript. Answer: [`Resume::Done`].
    Transcript(TranscriptOp),
    /// Answer: [`Resume::ToolNames`] in registry order.
    ListTools,
    /// Send the transcript and this catalog to the model.
    /// Answer: [`Resume::ModelReply`].
    QueryModel { tools: Vec<ToolSpec> },
    /// Answer: [`Resume::ToolOutput`].
    CallTool {
        provider: ProviderId,
        name: String,
        args: Value,
    },
    /// Start a provider and register its tools atomically.
    /// Answer: [`Resume::Launched`] with the registered tool names.
    LaunchProvider(LaunchSpec),
    /// Close a provider and unregister its tools.
    /// Answer: [`Resume::Closed`] with the removed tool names.
    CloseProvider(ProviderId),
}

impl Effect {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::Print(_) => "print",
            Self::Transcript(_) => "transcript",
            Self::ListTools => "list_tools",
            Self::QueryModel { .. } => "query_model",
            Self::CallTool { .. } => "call_tool",
            Self::LaunchProvider(_) => "launch_provider",
            Self::CloseProvider(_) => "close_provider",
        }
    }
}

/// The outcome of a performed effect.
#[derive(Debug)]
pub enum Resume {
    /// `None` at end of input.
    Line(Option<String>),
    Done,
    ToolNames(Vec<String>),
    ModelReply(Result<Vec<ContentBlock>>),
    ToolOutput(Result<Vec<ToolContent>>),
    Launched(Result<Vec<String>>),
    Closed(Result<Vec<String>>),
}

impl Resume {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Line(_) => "line",
            Self::Done => "done",
            Self::ToolNames(_) => "tool names",
            Self::ModelReply(_) => "model reply",
            Self::ToolOutput(_) => "tool output",
            Self::Launched(_) => "launch result",
            Self::Closed(_) => "close result",
        }
    }
}

/// What the interpreter wants next.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Perform(Effect),
    /// The session is over.
    Finished,
}
