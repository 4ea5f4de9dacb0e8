//! Configuration loading from tether.toml.

use std::path::{Path, PathBuf};
use std::time::Duration;

use runtime::providers::{DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use runtime::{AnthropicAuth, AnthropicBackend, LaunchSpec, Settings};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool servers launched before the first prompt.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// Backend provider configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Provider name (currently only "anthropic" supported).
    pub provider: String,

    pub model: String,

    pub max_tokens: u32,

    /// Standard Anthropic API key, sent as `x-api-key`.
    /// Mutually exclusive with auth_token.
    pub api_key: Option<String>,

    /// Token sent as `Authorization: Bearer`, for gateways.
    /// Mutually exclusive with api_key.
    pub auth_token: Option<String>,

    pub base_url: Option<String>,

    /// System prompt sent with every request.
    pub system: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            api_key: None,
            auth_token: None,
            base_url: None,
            system: None,
        }
    }
}

/// Limits of the agent loop. Timeouts are in seconds.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_tool_rounds: usize,
    pub handshake_timeout: u64,
    pub tool_timeout: u64,
    pub model_timeout: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            max_tool_rounds: settings.max_tool_rounds,
            handshake_timeout: settings.handshake_timeout.as_secs(),
            tool_timeout: settings.tool_timeout.as_secs(),
            model_timeout: settings.model_timeout.as_secs(),
        }
    }
}

impl AgentConfig {
    pub fn settings(&self) -> Settings {
        Settings {
            max_tool_rounds: self.max_tool_rounds,
            handshake_timeout: Duration::from_secs(self.handshake_timeout),
            tool_timeout: Duration::from_secs(self.tool_timeout),
            model_timeout: Duration::from_secs(self.model_timeout),
        }
    }
}

/// A tool server started at launch.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_cwd")]
    pub cwd: PathBuf,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_cwd() -> PathBuf {
    PathBuf::from(".")
}

impl ServerConfig {
    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            cwd: self.cwd.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if config.backend.provider != "anthropic" {
            return Err(ConfigError::UnsupportedProvider(config.backend.provider));
        }
        Ok(config)
    }

    /// Build the authentication from config.
    ///
    /// At most one of api_key or auth_token may be set; with neither,
    /// `env_key` (normally `ANTHROPIC_API_KEY`) is used as an API key.
    pub fn auth(&self, env_key: Option<String>) -> Result<AnthropicAuth, ConfigError> {
        match (&self.backend.api_key, &self.backend.auth_token) {
            (Some(key), None) => Ok(AnthropicAuth::ApiKey(key.clone())),
            (None, Some(token)) => Ok(AnthropicAuth::Bearer(token.clone())),
            (Some(_), Some(_)) => Err(ConfigError::AmbiguousAuth),
            (None, None) => env_key
                .filter(|key| !key.is_empty())
                .map(AnthropicAuth::ApiKey)
                .ok_or(ConfigError::MissingAuth),
        }
    }

    pub fn backend(&self, auth: AnthropicAuth) -> AnthropicBackend {
        let backend = &self.backend;
        let mut builder = AnthropicBackend::builder(auth, &backend.model)
            .max_tokens(backend.max_tokens)
            .base_url(backend.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL));
        if let Some(system) = &backend.system {
            builder = builder.system(system);
        }
        builder.build()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("unsupported backend provider `{0}`; only `anthropic` is available")]
    UnsupportedProvider(String),

    #[error(
        "authentication not configured: set ANTHROPIC_API_KEY, backend.api_key or backend.auth_token"
    )]
    MissingAuth,

    #[error(
        "ambiguous authentication: set either backend.api_key OR backend.auth_token, not both"
    )]
    AmbiguousAuth,
}
