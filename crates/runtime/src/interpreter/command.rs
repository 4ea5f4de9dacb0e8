//! REPL command grammar.

use crate::tools::args::split_escaped;

/// One line of user input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Quit,
    Help,
    ListTools,
    /// `/launch_stdio <cwd> <cmd> [args...]`, already tokenized.
    Launch(Vec<String>),
    DescribeTool(Option<String>),
    CallTool {
        name: Option<String>,
        args: Vec<String>,
    },
    DisableTool(Option<String>),
    GenerateTool,
    /// Anything that is not a command goes to the model verbatim.
    Chat(String),
}

impl Command {
    /// Only the command word is case-folded; arguments and chat text keep
    /// their case.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest),
            None => (line, ""),
        };

        match word.to_lowercase().as_str() {
            "/quit" => Self::Quit,
            "/help" => Self::Help,
            "/list_tools" => Self::ListTools,
            "/launch_stdio" => Self::Launch(split_escaped(rest)),
            "/describe_tool" => Self::DescribeTool(first_token(rest)),
            "/call_tool" => {
                let mut tokens = split_escaped(rest).into_iter();
                Self::CallTool {
                    name: tokens.next(),
                    args: tokens.collect(),
                }
            }
            "/disable_tool" => Self::DisableTool(first_token(rest)),
            "/generate_tool" => Self::GenerateTool,
            _ => Self::Chat(line.to_string()),
        }
    }
}

fn first_token(rest: &str) -> Option<String> {
    split_escaped(rest).into_iter().next()
}
