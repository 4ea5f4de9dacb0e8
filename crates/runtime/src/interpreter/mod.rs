//! The session state machine.
//!
//! [`Interpreter`] turns user input and effect results into [`Effect`]s. It
//! never performs I/O itself: the driver performs each effect and feeds the
//! outcome back through [`Interpreter::resume`]. The registry is passed in
//! read-only; it is mutated only by the driver while performing launch and
//! close effects.

mod command;
mod effect;

use std::collections::VecDeque;

use mcp::ToolContent;

pub use command::Command;
pub use effect::{Effect, Resume, Step};

use crate::conversation::TranscriptOp;
use crate::model::{ContentBlock, ToolResult, ToolUse, Turn};
use crate::tools::args::parse_arguments;
use crate::tools::{LaunchSpec, ToolRegistry};
use crate::{Error, Result};

pub const PROMPT: &str = "Query: ";

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

const HELP: &str = "\
Commands:
  /list_tools                          list registered tools
  /describe_tool <name>                show a tool's description and schema
  /call_tool <name> [key[:number]=value ...]
                                       call a tool directly
  /launch_stdio <cwd> <command> [args...]
                                       start a tool server over stdio
  /disable_tool <name>                 stop the server providing <name>
  /generate_tool                       not supported yet
  /help                                show this message
  /quit                                exit
Anything else is sent to the model.";

/// Which resume value the pending effect expects.
#[derive(Debug, Clone, PartialEq)]
enum Awaiting {
    Line,
    Ack,
    ToolNames,
    Launch,
    Close,
    DirectCall,
    ModelReply,
    /// A call made on the model's behalf, answering this tool use id.
    AgentCall(String),
}

impl Awaiting {
    fn describe(&self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Ack => "done",
            Self::ToolNames => "tool names",
            Self::Launch => "launch result",
            Self::Close => "close result",
            Self::DirectCall | Self::AgentCall(_) => "tool output",
            Self::ModelReply => "model reply",
        }
    }
}

/// State of one user query and its tool rounds.
#[derive(Debug, Default)]
struct Exchange {
    rounds: usize,
    text: Vec<String>,
    pending: VecDeque<ToolUse>,
}

#[derive(Debug)]
pub struct Interpreter {
    max_tool_rounds: usize,
    plan: VecDeque<(Effect, Awaiting)>,
    awaiting: Option<Awaiting>,
    exchange: Option<Exchange>,
    finished: bool,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOOL_ROUNDS)
    }
}

impl Interpreter {
    /// `max_tool_rounds` caps how many model responses with tool uses one
    /// query may produce.
    pub fn new(max_tool_rounds: usize) -> Self {
        Self {
            max_tool_rounds,
            plan: VecDeque::new(),
            awaiting: None,
            exchange: None,
            finished: false,
        }
    }

    /// The first step of a session: prompt for input.
    pub fn start(&mut self) -> Step {
        self.next_step()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed the outcome of the last effect and get the next step.
    ///
    /// Fails with [`Error::UnexpectedResume`] if `value` does not answer the
    /// pending effect; the interpreter state is left as it was.
    pub fn resume(&mut self, registry: &ToolRegistry, value: Resume) -> Result<Step> {
        let Some(awaiting) = self.awaiting.take() else {
            return Err(Error::UnexpectedResume {
                expected: "nothing",
                got: value.kind(),
            });
        };

        match (awaiting, value) {
            (Awaiting::Line, Resume::Line(None)) => self.finish(),
            (Awaiting::Line, Resume::Line(Some(line))) => self.interpret(registry, &line),
            (Awaiting::Ack, Resume::Done) => {}
            (Awaiting::ToolNames, Resume::ToolNames(names)) => {
                if names.is_empty() {
                    self.say("(no tools registered)");
                } else {
                    self.say(names.join("\n"));
                }
            }
            (Awaiting::Launch, Resume::Launched(result)) => match result {
                Ok(names) if names.is_empty() => self.say("Connected. The server exposes no tools."),
                Ok(names) => self.say(format!("Connected. Tools: {}", names.join(", "))),
                Err(e) => self.report(&e),
            },
            (Awaiting::Close, Resume::Closed(result)) => match result {
                Ok(names) => self.say(format!("Disabled. Removed tools: {}", names.join(", "))),
                Err(e) => self.report(&e),
            },
            (Awaiting::DirectCall, Resume::ToolOutput(result)) => match result {
                Ok(content) => self.show_output(&content),
                Err(e) => self.report(&e),
            },
            (Awaiting::ModelReply, Resume::ModelReply(result)) => {
                self.on_model_reply(registry, result)
            }
            (Awaiting::AgentCall(id), Resume::ToolOutput(result)) => {
                self.on_agent_output(registry, id, result)
            }
            (awaiting, value) => {
                let expected = awaiting.describe();
                self.awaiting = Some(awaiting);
                return Err(Error::UnexpectedResume {
                    expected,
                    got: value.kind(),
                });
            }
        }

        Ok(self.next_step())
    }

    fn next_step(&mut self) -> Step {
        if self.finished {
            return Step::Finished;
        }
        let (effect, awaiting) = self.plan.pop_front().unwrap_or_else(|| {
            (
                Effect::Read {
                    prompt: PROMPT.to_string(),
                },
                Awaiting::Line,
            )
        });
        self.awaiting = Some(awaiting);
        Step::Perform(effect)
    }

    fn push(&mut self, effect: Effect, awaiting: Awaiting) {
        self.plan.push_back((effect, awaiting));
    }

    fn say(&mut self, text: impl Into<String>) {
        self.push(Effect::Print(text.into()), Awaiting::Ack);
    }

    fn report(&mut self, error: &Error) {
        self.say(format!("Error: {error}"));
    }

    fn finish(&mut self) {
        self.finished = true;
        self.plan.clear();
        self.exchange = None;
    }

    fn interpret(&mut self, registry: &ToolRegistry, line: &str) {
        match Command::parse(line) {
            Command::Empty => {}
            Command::Quit => self.finish(),
            Command::Help => self.say(HELP),
            Command::ListTools => self.push(Effect::ListTools, Awaiting::ToolNames),
            Command::Launch(tokens) => self.launch(tokens),
            Command::DescribeTool(name) => self.describe(registry, name),
            Command::CallTool { name, args } => self.call(registry, name, &args),
            Command::DisableTool(name) => self.disable(registry, name),
            Command::GenerateTool => self.say("/generate_tool is not supported yet."),
            Command::Chat(query) => self.begin_exchange(registry, query),
        }
    }

    fn launch(&mut self, tokens: Vec<String>) {
        let mut tokens = tokens.into_iter();
        let (Some(cwd), Some(command)) = (tokens.next(), tokens.next()) else {
            self.say("Usage: /launch_stdio <cwd> <command> [args...]");
            return;
        };
        let spec = LaunchSpec {
            cwd: cwd.into(),
            command,
            args: tokens.collect(),
        };
        self.push(Effect::LaunchProvider(spec), Awaiting::Launch);
    }

    fn describe(&mut self, registry: &ToolRegistry, name: Option<String>) {
        let Some(name) = name else {
            self.say("Usage: /describe_tool <name>");
            return;
        };
        let Some(tool) = registry.lookup(&name) else {
            self.report(&Error::ToolNotFound(name));
            return;
        };

        let schema = serde_json::to_string_pretty(&tool.input_schema)
            .unwrap_or_else(|_| tool.input_schema.to_string());
        let text = format!(
            "Name: {}\nDescription: {}\nInput schema:\n{}",
            tool.name, tool.description, schema
        );
        self.say(text);
    }

    fn call(&mut self, registry: &ToolRegistry, name: Option<String>, args: &[String]) {
        let Some(name) = name else {
            self.say("Usage: /call_tool <name> [key[:number]=value ...]");
            return;
        };
        if registry.lookup(&name).is_none() {
            self.report(&Error::ToolNotFound(name));
            return;
        }
        let Some(provider) = registry.find_provider(&name) else {
            self.report(&Error::NoProviderForTool(name));
            return;
        };

        let (arguments, errors) = parse_arguments(args);
        for error in &errors {
            self.report(error);
        }
        self.push(
            Effect::CallTool {
                provider,
                name,
                args: arguments.into(),
            },
            Awaiting::DirectCall,
        );
    }

    fn show_output(&mut self, content: &[ToolContent]) {
        let Some(first) = content.first() else {
            self.say("(tool returned no content)");
            return;
        };
        let annotations = first
            .annotations
            .as_ref()
            .map_or_else(|| "none".to_string(), |value| value.to_string());
        self.say(format!(
            "Type: {}\nText: {}\nAnnotations: {}",
            first.kind,
            first.text.as_deref().unwrap_or(""),
            annotations
        ));
    }

    fn disable(&mut self, registry: &ToolRegistry, name: Option<String>) {
        let Some(name) = name else {
            self.say("Usage: /disable_tool <name>");
            return;
        };
        match registry.find_provider(&name) {
            Some(provider) => self.push(Effect::CloseProvider(provider), Awaiting::Close),
            None => self.report(&Error::ToolNotFound(name)),
        }
    }

    fn begin_exchange(&mut self, registry: &ToolRegistry, query: String) {
        self.exchange = Some(Exchange::default());
        self.push(Effect::Transcript(TranscriptOp::Reset), Awaiting::Ack);
        self.push(
            Effect::Transcript(TranscriptOp::Append(Turn::User(query))),
            Awaiting::Ack,
        );
        self.push(
            Effect::QueryModel {
                tools: registry.specs(),
            },
            Awaiting::ModelReply,
        );
    }

    fn on_model_reply(&mut self, registry: &ToolRegistry, result: Result<Vec<ContentBlock>>) {
        let Some(mut exchange) = self.exchange.take() else {
            return;
        };
        let blocks = match result {
            Ok(blocks) => blocks,
            Err(e) => {
                self.conclude(exchange, Some(e));
                return;
            }
        };

        let mut uses = VecDeque::new();
        for block in &blocks {
            match block {
                ContentBlock::Text(text) => exchange.text.push(text.clone()),
                ContentBlock::ToolUse(tool_use) => uses.push_back(tool_use.clone()),
            }
        }
        self.push(
            Effect::Transcript(TranscriptOp::Append(Turn::Assistant(blocks))),
            Awaiting::Ack,
        );

        if uses.is_empty() {
            self.conclude(exchange, None);
            return;
        }
        if exchange.rounds >= self.max_tool_rounds {
            let max = self.max_tool_rounds;
            self.conclude(exchange, Some(Error::TooManyToolRounds(max)));
            return;
        }

        exchange.rounds += 1;
        exchange.pending = uses;
        self.exchange = Some(exchange);
        self.dispatch_next(registry);
    }

    fn on_agent_output(
        &mut self,
        registry: &ToolRegistry,
        tool_use_id: String,
        result: Result<Vec<ToolContent>>,
    ) {
        let (content, is_error) = match result {
            Ok(content) => (content, false),
            Err(e) => (vec![ToolContent::text(e.to_string())], true),
        };
        let turn = Turn::ToolResult(ToolResult {
            tool_use_id,
            content,
            is_error,
        });
        self.push(Effect::Transcript(TranscriptOp::Append(turn)), Awaiting::Ack);
        self.dispatch_next(registry);
    }

    /// Call the next pending tool use, or query the model again once the
    /// round is done.
    fn dispatch_next(&mut self, registry: &ToolRegistry) {
        let Some(next) = self.exchange.as_mut().map(|e| e.pending.pop_front()) else {
            return;
        };

        let Some(tool_use) = next else {
            self.push(
                Effect::QueryModel {
                    tools: registry.specs(),
                },
                Awaiting::ModelReply,
            );
            return;
        };

        match registry.find_provider(&tool_use.name) {
            Some(provider) => self.push(
                Effect::CallTool {
                    provider,
                    name: tool_use.name,
                    args: tool_use.input,
                },
                Awaiting::AgentCall(tool_use.id),
            ),
            None => {
                if let Some(exchange) = self.exchange.take() {
                    self.conclude(exchange, Some(Error::NoProviderForTool(tool_use.name)));
                }
            }
        }
    }

    /// End the exchange: show the text collected so far, then the error.
    fn conclude(&mut self, exchange: Exchange, error: Option<Error>) {
        if !exchange.text.is_empty() {
            self.say(exchange.text.join("\n"));
        }
        if let Some(error) = error {
            self.report(&error);
        }
    }
}
