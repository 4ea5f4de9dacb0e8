//! Performs the interpreter's effects.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use mcp::ToolContent;
use serde_json::Value;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::console::Console;
use crate::conversation::Conversation;
use crate::interpreter::{DEFAULT_MAX_TOOL_ROUNDS, Effect, Interpreter, Resume, Step};
use crate::model::{Backend, ContentBlock, ModelRequest, ToolSpec};
use crate::shutdown::shutdown_signal;
use crate::tools::{LaunchSpec, Launcher, ProviderId, ToolProvider, ToolRegistry};
use crate::{Error, Result};

/// Limits applied while driving a session.
#[derive(Debug, Clone)]
pub struct Settings {
    pub max_tool_rounds: usize,
    /// Launch plus handshake of one provider.
    pub handshake_timeout: Duration,
    pub tool_timeout: Duration,
    pub model_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            handshake_timeout: Duration::from_secs(10),
            tool_timeout: Duration::from_secs(60),
            model_timeout: Duration::from_secs(120),
        }
    }
}

/// Owns every resource of a session and runs the interpreter against them.
///
/// Providers live here and nowhere else; the registry only holds their ids.
/// [`Driver::run`] closes each provider exactly once, however the session
/// ends.
pub struct Driver<B, L: Launcher, C> {
    session_id: Uuid,
    backend: B,
    launcher: L,
    console: C,
    settings: Settings,
    registry: ToolRegistry,
    providers: HashMap<ProviderId, L::Provider>,
    conversation: Conversation,
    next_provider: u64,
}

impl<B: Backend, L: Launcher, C: Console> Driver<B, L, C> {
    pub fn new(backend: B, launcher: L, console: C) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            backend,
            launcher,
            console,
            settings: Settings::default(),
            registry: ToolRegistry::new(),
            providers: HashMap::new(),
            conversation: Conversation::new(),
            next_provider: 1,
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Start a provider and register all of its tools, or none.
    ///
    /// On a name collision the provider is closed again and the registry is
    /// unchanged. A handshake that outlives the configured timeout fails with
    /// [`Error::ConnectFailed`]; a provider that was already started by then
    /// is closed before returning.
    pub async fn launch(&mut self, spec: &LaunchSpec) -> Result<Vec<String>> {
        let limit = self.settings.handshake_timeout;
        let deadline = Instant::now() + limit;
        let timed_out = || {
            warn!(command = %spec.command, ?limit, "handshake timed out");
            Error::ConnectFailed {
                command: spec.command.clone(),
                reason: format!("handshake timed out after {limit:?}"),
            }
        };

        let mut provider = timeout_at(deadline, self.launcher.launch(spec))
            .await
            .map_err(|_| timed_out())??;

        let listed = match timeout_at(deadline, provider.list_tools()).await {
            Ok(listed) => listed,
            Err(_) => Err(timed_out()),
        };
        let tools = match listed {
            Ok(tools) => tools,
            Err(e) => {
                if let Err(close_err) = provider.close().await {
                    debug!(error = %close_err, "close after failed listing");
                }
                return Err(e);
            }
        };

        let id = ProviderId::new(self.next_provider);
        self.next_provider += 1;

        let names: Vec<String> = tools.iter().map(|tool| tool.name.clone()).collect();
        if let Err(e) = self.registry.register(tools, id) {
            warn!(command = %spec.command, error = %e, "rejecting provider");
            if let Err(close_err) = provider.close().await {
                warn!(command = %spec.command, error = %close_err, "close after rejection failed");
            }
            return Err(e);
        }

        info!(provider = %id, command = %spec.command, tools = names.len(), "provider ready");
        self.providers.insert(id, provider);
        Ok(names)
    }

    /// Run the REPL until `/quit`, end of input, Ctrl+C or SIGTERM, then
    /// close every provider.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Like [`Driver::run`], but the session also ends when `shutdown`
    /// completes, whatever effect is in flight at that moment.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let span = info_span!("session", id = %self.session_id);
        async move {
            info!("session started");
            let outcome = tokio::select! {
                outcome = self.drive() => outcome,
                () = shutdown => {
                    info!("shutdown requested");
                    Ok(())
                }
            };
            self.shutdown().await;
            if let Err(e) = &outcome {
                warn!(error = %e, "session aborted");
            }
            info!("session ended");
            outcome
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self) -> Result<()> {
        let mut interpreter = Interpreter::new(self.settings.max_tool_rounds);
        let mut step = interpreter.start();

        while let Step::Perform(effect) = step {
            let value = self.perform(effect).await?;
            step = interpreter.resume(&self.registry, value)?;
        }
        Ok(())
    }

    async fn perform(&mut self, effect: Effect) -> Result<Resume> {
        debug!(effect = effect.kind(), "perform");

        let value = match effect {
            Effect::Read { prompt } => Resume::Line(self.console.read_line(&prompt).await?),
            Effect::Print(text) => {
                self.console.print(&text).await?;
                Resume::Done
            }
            Effect::Transcript(op) => {
                self.conversation.apply(op);
                Resume::Done
            }
            Effect::ListTools => Resume::ToolNames(self.registry.names()),
            Effect::QueryModel { tools } => Resume::ModelReply(self.query_model(&tools).await),
            Effect::CallTool {
                provider,
                name,
                args,
            } => Resume::ToolOutput(self.call_tool(provider, &name, args).await),
            Effect::LaunchProvider(spec) => Resume::Launched(self.launch(&spec).await),
            Effect::CloseProvider(id) => Resume::Closed(self.close_provider(id).await),
        };
        Ok(value)
    }

    async fn query_model(&self, tools: &[ToolSpec]) -> Result<Vec<ContentBlock>> {
        let request = ModelRequest {
            turns: self.conversation.turns(),
            tools,
        };
        let limit = self.settings.model_timeout;

        let response = timeout(limit, self.backend.call(request))
            .await
            .map_err(|_| Error::Timeout {
                what: "model call".to_string(),
                after: limit,
            })??;

        debug!(
            blocks = response.content.len(),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "model replied"
        );
        Ok(response.content)
    }

    async fn call_tool(
        &mut self,
        id: ProviderId,
        name: &str,
        args: Value,
    ) -> Result<Vec<ToolContent>> {
        let limit = self.settings.tool_timeout;
        let provider = self.providers.get_mut(&id).ok_or(Error::ProviderClosed)?;

        match timeout(limit, provider.call_tool(name, args)).await {
            Ok(result) => {
                if let Err(e) = &result {
                    warn!(provider = %id, tool = name, error = %e, "tool call failed");
                }
                result
            }
            Err(_) => Err(Error::Timeout {
                what: format!("tool `{name}`"),
                after: limit,
            }),
        }
    }

    async fn close_provider(&mut self, id: ProviderId) -> Result<Vec<String>> {
        let removed = self.registry.unregister_provider(id);
        let provider = self.providers.remove(&id).ok_or(Error::ProviderClosed)?;
        provider.close().await?;

        info!(provider = %id, tools = removed.len(), "provider closed");
        Ok(removed.into_iter().map(|tool| tool.name).collect())
    }

    async fn shutdown(&mut self) {
        let mut providers: Vec<_> = self.providers.drain().collect();
        providers.sort_by_key(|(id, _)| *id);

        for (id, provider) in providers {
            self.registry.unregister_provider(id);
            match provider.close().await {
                Ok(()) => debug!(provider = %id, "closed"),
                Err(e) => warn!(provider = %id, error = %e, "close failed"),
            }
        }
    }
}
