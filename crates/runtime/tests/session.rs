//! End-to-end sessions against scripted fakes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mcp::ToolContent;
use runtime::model::{ModelRequest, ModelResponse, ToolResult, ToolUse, Usage};
use runtime::{
    Backend, Console, ContentBlock, Driver, Error, LaunchSpec, Launcher, ModelError, Settings,
    ToolProvider, ToolSpec, Turn,
};
use serde_json::{Value, json};

type Shared<T> = Arc<Mutex<T>>;

#[derive(Default)]
struct ScriptedBackend {
    replies: Mutex<VecDeque<Vec<ContentBlock>>>,
    seen: Shared<Vec<Vec<Turn>>>,
}

impl ScriptedBackend {
    fn new(replies: Vec<Vec<ContentBlock>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen: Arc::default(),
        }
    }
}

impl Backend for ScriptedBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        self.seen.lock().unwrap().push(request.turns.to_vec());
        let content = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::InvalidResponse("script exhausted".into()))?;
        Ok(ModelResponse {
            content,
            usage: Usage::default(),
        })
    }
}

#[derive(Clone, Default)]
struct FakeLauncher {
    servers: HashMap<String, Vec<&'static str>>,
    stalled: HashSet<String>,
    closes: Shared<Vec<String>>,
}

impl FakeLauncher {
    fn with_server(mut self, command: &str, tools: &[&'static str]) -> Self {
        self.servers.insert(command.to_string(), tools.to_vec());
        self
    }

    /// Starts, but never answers the tool listing.
    fn with_stalled_server(mut self, command: &str) -> Self {
        self.servers.insert(command.to_string(), Vec::new());
        self.stalled.insert(command.to_string());
        self
    }
}

impl Launcher for FakeLauncher {
    type Provider = FakeProvider;

    async fn launch(&self, spec: &LaunchSpec) -> runtime::Result<FakeProvider> {
        let tools = self
            .servers
            .get(&spec.command)
            .ok_or_else(|| Error::ConnectFailed {
                command: spec.command.clone(),
                reason: "no such server".into(),
            })?;
        Ok(FakeProvider {
            command: spec.command.clone(),
            tools: tools.clone(),
            stall_listing: self.stalled.contains(&spec.command),
            closes: self.closes.clone(),
        })
    }
}

struct FakeProvider {
    command: String,
    tools: Vec<&'static str>,
    stall_listing: bool,
    closes: Shared<Vec<String>>,
}

impl ToolProvider for FakeProvider {
    async fn list_tools(&mut self) -> runtime::Result<Vec<ToolSpec>> {
        if self.stall_listing {
            std::future::pending::<()>().await;
        }
        Ok(self
            .tools
            .iter()
            .map(|name| ToolSpec {
                name: name.to_string(),
                description: format!("{name} from {}", self.command),
                input_schema: json!({"type": "object"}),
            })
            .collect())
    }

    async fn call_tool(&mut self, name: &str, args: Value) -> runtime::Result<Vec<ToolContent>> {
        match name {
            "sum" => {
                let total = args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0);
                Ok(vec![ToolContent::text(total.to_string())])
            }
            "slow" => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            "fail" => Err(Error::ToolInvocation {
                name: name.to_string(),
                message: "boom".into(),
            }),
            other => Ok(vec![ToolContent::text(format!("{other}: {args}"))]),
        }
    }

    async fn close(self) -> runtime::Result<()> {
        self.closes.lock().unwrap().push(self.command);
        Ok(())
    }
}

/// Never finishes its handshake.
struct HangingLauncher;

impl Launcher for HangingLauncher {
    type Provider = FakeProvider;

    async fn launch(&self, _spec: &LaunchSpec) -> runtime::Result<FakeProvider> {
        std::future::pending().await
    }
}

struct ScriptedConsole {
    input: VecDeque<String>,
    output: Shared<Vec<String>>,
}

impl ScriptedConsole {
    fn new(lines: &[&str]) -> (Self, Shared<Vec<String>>) {
        let output = Shared::default();
        let console = Self {
            input: lines.iter().map(|line| line.to_string()).collect(),
            output: output.clone(),
        };
        (console, output)
    }
}

impl Console for ScriptedConsole {
    async fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        Ok(self.input.pop_front())
    }

    async fn print(&mut self, text: &str) -> io::Result<()> {
        self.output.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Waits for input that never arrives.
struct SilentConsole;

impl Console for SilentConsole {
    async fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        std::future::pending().await
    }

    async fn print(&mut self, _text: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Fails every read, as a closed terminal would.
struct BrokenConsole;

impl Console for BrokenConsole {
    async fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal gone"))
    }

    async fn print(&mut self, _text: &str) -> io::Result<()> {
        Ok(())
    }
}

fn spec(command: &str) -> LaunchSpec {
    LaunchSpec {
        cwd: ".".into(),
        command: command.to_string(),
        args: Vec::new(),
    }
}

fn text(s: &str) -> ContentBlock {
    ContentBlock::Text(s.to_string())
}

fn use_tool(id: &str, name: &str, input: Value) -> ContentBlock {
    ContentBlock::ToolUse(ToolUse {
        id: id.to_string(),
        name: name.to_string(),
        input,
    })
}

#[tokio::test]
async fn quit_closes_every_provider_once() {
    let launcher = FakeLauncher::default()
        .with_server("alpha", &["sum"])
        .with_server("beta", &["echo"]);
    let closes = launcher.closes.clone();
    let (console, _) = ScriptedConsole::new(&["/quit", "never read"]);

    let mut driver = Driver::new(ScriptedBackend::default(), launcher, console);
    driver.launch(&spec("alpha")).await.unwrap();
    driver.launch(&spec("beta")).await.unwrap();
    assert_eq!(driver.provider_count(), 2);

    driver.run().await.unwrap();

    assert_eq!(*closes.lock().unwrap(), ["alpha", "beta"]);
}

#[tokio::test]
async fn end_of_input_ends_the_session() {
    let launcher = FakeLauncher::default().with_server("alpha", &["sum"]);
    let closes = launcher.closes.clone();
    let (console, output) = ScriptedConsole::new(&[]);

    let mut driver = Driver::new(ScriptedBackend::default(), launcher, console);
    driver.launch(&spec("alpha")).await.unwrap();
    driver.run().await.unwrap();

    assert!(output.lock().unwrap().is_empty());
    assert_eq!(*closes.lock().unwrap(), ["alpha"]);
}

#[tokio::test]
async fn collision_rolls_back_the_new_provider() {
    let launcher = FakeLauncher::default()
        .with_server("first", &["sum"])
        .with_server("second", &["echo", "sum"]);
    let closes = launcher.closes.clone();
    let (console, _) = ScriptedConsole::new(&[]);

    let mut driver = Driver::new(ScriptedBackend::default(), launcher, console);
    assert_eq!(driver.launch(&spec("first")).await.unwrap(), ["sum"]);

    let err = driver.launch(&spec("second")).await.unwrap_err();

    assert!(matches!(err, Error::DuplicateToolName(ref name) if name == "sum"));
    assert_eq!(driver.registry().names(), ["sum"]);
    assert_eq!(driver.provider_count(), 1);
    assert_eq!(*closes.lock().unwrap(), ["second"]);

    driver.run().await.unwrap();
    assert_eq!(*closes.lock().unwrap(), ["second", "first"]);
}

#[tokio::test(start_paused = true)]
async fn hanging_handshake_times_out() {
    let (console, _) = ScriptedConsole::new(&[]);
    let mut driver = Driver::new(ScriptedBackend::default(), HangingLauncher, console)
        .with_settings(Settings {
            handshake_timeout: Duration::from_secs(10),
            ..Settings::default()
        });

    let err = driver.launch(&spec("stuck")).await.unwrap_err();

    assert!(matches!(err, Error::ConnectFailed { ref command, .. } if command == "stuck"));
    assert!(driver.registry().is_empty());
    assert_eq!(driver.provider_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn stalled_tool_listing_times_out_and_closes_the_provider() {
    let launcher = FakeLauncher::default().with_stalled_server("stall");
    let closes = launcher.closes.clone();
    let (console, _) = ScriptedConsole::new(&[]);
    let mut driver = Driver::new(ScriptedBackend::default(), launcher, console);

    let err = driver.launch(&spec("stall")).await.unwrap_err();

    assert!(matches!(err, Error::ConnectFailed { ref command, .. } if command == "stall"));
    assert!(driver.registry().is_empty());
    assert_eq!(driver.provider_count(), 0);
    assert_eq!(*closes.lock().unwrap(), ["stall"]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_signal_closes_every_provider_once() {
    let launcher = FakeLauncher::default()
        .with_server("alpha", &["sum"])
        .with_server("beta", &["echo"]);
    let closes = launcher.closes.clone();

    let mut driver = Driver::new(ScriptedBackend::default(), launcher, SilentConsole);
    driver.launch(&spec("alpha")).await.unwrap();
    driver.launch(&spec("beta")).await.unwrap();

    driver
        .run_until(tokio::time::sleep(Duration::from_secs(1)))
        .await
        .unwrap();

    assert_eq!(*closes.lock().unwrap(), ["alpha", "beta"]);
}

#[tokio::test]
async fn console_failure_still_closes_every_provider() {
    let launcher = FakeLauncher::default()
        .with_server("alpha", &["sum"])
        .with_server("beta", &["echo"]);
    let closes = launcher.closes.clone();

    let mut driver = Driver::new(ScriptedBackend::default(), launcher, BrokenConsole);
    driver.launch(&spec("alpha")).await.unwrap();
    driver.launch(&spec("beta")).await.unwrap();

    let err = driver.run().await.unwrap_err();

    assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
    assert_eq!(*closes.lock().unwrap(), ["alpha", "beta"]);
}

#[tokio::test]
async fn answer_without_tools_needs_one_model_call() {
    let backend = ScriptedBackend::new(vec![vec![text("Hello!")]]);
    let seen = backend.seen.clone();
    let (console, output) = ScriptedConsole::new(&["Hi there", "/quit"]);

    Driver::new(backend, FakeLauncher::default(), console)
        .run()
        .await
        .unwrap();

    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(*output.lock().unwrap(), ["Hello!"]);
}

#[tokio::test]
async fn tool_round_feeds_results_back_in_order() {
    let first = vec![
        text("Adding."),
        use_tool("tu_1", "sum", json!({"a": 2, "b": 3})),
    ];
    let backend = ScriptedBackend::new(vec![first.clone(), vec![text("It is 5.")]]);
    let seen = backend.seen.clone();
    let launcher = FakeLauncher::default().with_server("math", &["sum"]);
    let (console, output) = ScriptedConsole::new(&["What is 2+3?"]);

    let mut driver = Driver::new(backend, launcher, console);
    driver.launch(&spec("math")).await.unwrap();
    driver.run().await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], [Turn::User("What is 2+3?".into())]);
    assert_eq!(
        seen[1],
        [
            Turn::User("What is 2+3?".into()),
            Turn::Assistant(first),
            Turn::ToolResult(ToolResult {
                tool_use_id: "tu_1".into(),
                content: vec![ToolContent::text("5")],
                is_error: false,
            }),
        ]
    );
    assert_eq!(*output.lock().unwrap(), ["Adding.\nIt is 5."]);
}

#[tokio::test]
async fn each_query_starts_a_fresh_transcript() {
    let backend = ScriptedBackend::new(vec![vec![text("one")], vec![text("two")]]);
    let seen = backend.seen.clone();
    let (console, _) = ScriptedConsole::new(&["first", "second"]);

    Driver::new(backend, FakeLauncher::default(), console)
        .run()
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen[1], [Turn::User("second".into())]);
}

#[tokio::test]
async fn failed_tool_is_reported_to_the_model() {
    let backend = ScriptedBackend::new(vec![
        vec![use_tool("tu_1", "fail", json!({}))],
        vec![text("The tool failed.")],
    ]);
    let seen = backend.seen.clone();
    let launcher = FakeLauncher::default().with_server("flaky", &["fail"]);
    let (console, output) = ScriptedConsole::new(&["try it"]);

    let mut driver = Driver::new(backend, launcher, console);
    driver.launch(&spec("flaky")).await.unwrap();
    driver.run().await.unwrap();

    let seen = seen.lock().unwrap();
    let Turn::ToolResult(result) = &seen[1][2] else {
        panic!("expected a tool result, got {:?}", seen[1][2]);
    };
    assert!(result.is_error);
    assert_eq!(result.content[0].as_text(), Some("tool `fail` failed: boom"));
    assert_eq!(*output.lock().unwrap(), ["The tool failed."]);
}

#[tokio::test(start_paused = true)]
async fn slow_tool_times_out_and_the_loop_continues() {
    let backend = ScriptedBackend::new(vec![
        vec![use_tool("tu_1", "slow", json!({}))],
        vec![text("Gave up.")],
    ]);
    let seen = backend.seen.clone();
    let launcher = FakeLauncher::default().with_server("sloth", &["slow"]);
    let (console, _) = ScriptedConsole::new(&["go"]);

    let mut driver = Driver::new(backend, launcher, console).with_settings(Settings {
        tool_timeout: Duration::from_secs(5),
        ..Settings::default()
    });
    driver.launch(&spec("sloth")).await.unwrap();
    driver.run().await.unwrap();

    let seen = seen.lock().unwrap();
    let Turn::ToolResult(result) = &seen[1][2] else {
        panic!("expected a tool result");
    };
    assert!(result.is_error);
    assert!(result.content[0].as_text().unwrap().contains("timed out"));
}

#[tokio::test]
async fn repl_commands_reach_the_registry() {
    let launcher = FakeLauncher::default()
        .with_server("math", &["sum"])
        .with_server("words", &["echo", "upper"])
        .with_server("clash", &["upper"]);
    let closes = launcher.closes.clone();
    let (console, output) = ScriptedConsole::new(&[
        "/launch_stdio . math",
        "/launch_stdio . words",
        "/launch_stdio . clash",
        "/list_tools",
        "/call_tool sum a:number=2 b:number=3",
        "/disable_tool echo",
        "/list_tools",
        "/call_tool echo x=1",
        "/quit",
    ]);

    Driver::new(ScriptedBackend::default(), launcher, console)
        .run()
        .await
        .unwrap();

    assert_eq!(
        *output.lock().unwrap(),
        [
            "Connected. Tools: sum",
            "Connected. Tools: echo, upper",
            "Error: tool name collision: `upper` is already registered",
            "sum\necho\nupper",
            "Type: text\nText: 5\nAnnotations: none",
            "Disabled. Removed tools: echo, upper",
            "sum",
            "Error: tool `echo` not found",
        ]
    );
    assert_eq!(*closes.lock().unwrap(), ["clash", "words", "math"]);
}

#[tokio::test]
async fn unreachable_server_is_reported() {
    let (console, output) = ScriptedConsole::new(&["/launch_stdio /tmp missing-server"]);

    Driver::new(ScriptedBackend::default(), FakeLauncher::default(), console)
        .run()
        .await
        .unwrap();

    assert_eq!(
        *output.lock().unwrap(),
        ["Error: failed to connect to `missing-server`: no such server"]
    );
}
