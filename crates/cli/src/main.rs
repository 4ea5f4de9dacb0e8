mod config;
mod error;

use std::path::{Path, PathBuf};

use clap::Parser;
use runtime::{Driver, McpLauncher, StdConsole};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

const CONFIG_FILE: &str = "tether.toml";

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Chat with a model that can use MCP tool servers", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file [default: ./tether.toml if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model to use, overriding the configuration
    #[arg(short, long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };
    // A pending stdin read blocks runtime shutdown after Ctrl+C or SIGTERM.
    std::process::exit(code);
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(model) = cli.model {
        config.backend.model = model;
    }
    let auth = config.auth(std::env::var("ANTHROPIC_API_KEY").ok())?;
    let backend = config.backend(auth);

    println!("tether v{}", env!("CARGO_PKG_VERSION"));
    println!("Model: {}", backend.model());

    let mut driver = Driver::new(backend, McpLauncher::new(), StdConsole::new())
        .with_settings(config.agent.settings());

    for server in &config.servers {
        let spec = server.launch_spec();
        match driver.launch(&spec).await {
            Ok(tools) => println!("Started {}: {}", spec.command, tools.join(", ")),
            Err(e) => {
                warn!(command = %spec.command, error = %e, "startup server failed");
                eprintln!("Failed to start {}: {e}", spec.command);
            }
        }
    }

    println!("Type /help for commands, /quit or Ctrl+D to exit.\n");
    driver.run().await?;
    println!("\nSession ended.");
    Ok(())
}

/// An explicit `--config` must exist; otherwise `tether.toml` is optional.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(CONFIG_FILE), false),
    };

    if !path.exists() {
        if required {
            return Err(Error::ConfigNotFound { path });
        }
        return Ok(Config::default());
    }

    let config = Config::load(&path)?;
    info!(path = %path.display(), servers = config.servers.len(), "loaded config");
    Ok(config)
}
