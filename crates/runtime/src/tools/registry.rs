//! Tool registry: which provider serves which tool.

use std::collections::HashSet;
use std::fmt;

use crate::model::ToolSpec;
use crate::{Error, Result};

/// Handle to a provider owned by the driver.
///
/// The registry only uses it to route calls; it never owns the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(u64);

impl ProviderId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider-{}", self.0)
    }
}

/// A tool with the provider serving it.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredTool {
    pub tool: ToolSpec,
    pub provider: ProviderId,
}

/// All tools known to the session, in registration order.
///
/// Tool names are unique across providers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every tool of `provider`, or none of them.
    ///
    /// Fails with [`Error::DuplicateToolName`] if any name is already taken
    /// (or repeated within `tools`); the registry is left untouched.
    pub fn register(&mut self, tools: Vec<ToolSpec>, provider: ProviderId) -> Result<()> {
        let mut incoming = HashSet::new();
        for tool in &tools {
            if self.lookup(&tool.name).is_some() || !incoming.insert(tool.name.as_str()) {
                return Err(Error::DuplicateToolName(tool.name.clone()));
            }
        }

        self.tools.extend(
            tools
                .into_iter()
                .map(|tool| RegisteredTool { tool, provider }),
        );
        Ok(())
    }

    /// Remove all tools served by `provider`, returning them in order.
    pub fn unregister_provider(&mut self, provider: ProviderId) -> Vec<ToolSpec> {
        let (removed, kept) = std::mem::take(&mut self.tools)
            .into_iter()
            .partition::<Vec<_>, _>(|entry| entry.provider == provider);
        self.tools = kept;
        removed.into_iter().map(|entry| entry.tool).collect()
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolSpec> {
        self.entry(name).map(|entry| &entry.tool)
    }

    pub fn find_provider(&self, name: &str) -> Option<ProviderId> {
        self.entry(name).map(|entry| entry.provider)
    }

    /// All tools in registration order.
    pub fn all(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.iter().map(|entry| &entry.tool)
    }

    pub fn names(&self) -> Vec<String> {
        self.all().map(|tool| tool.name.clone()).collect()
    }

    /// The catalog sent to the model.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.all().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn entry(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|entry| entry.tool.name == name)
    }
}
