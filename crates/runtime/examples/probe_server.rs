//! Launch one stdio tool server, list its tools and optionally call one.
//!
//! Run with:
//! cargo run --example probe_server -- <cwd> <command> [args...]
//!
//! Set `PROBE_TOOL=name` and `PROBE_ARGS='{"key": "value"}'` to call a tool.

use runtime::{LaunchSpec, Launcher, McpLauncher, ToolProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let (Some(cwd), Some(command)) = (argv.next(), argv.next()) else {
        eprintln!("usage: probe_server <cwd> <command> [args...]");
        std::process::exit(2);
    };
    let spec = LaunchSpec {
        cwd: cwd.into(),
        command,
        args: argv.collect(),
    };

    println!("Launching {} {:?} in {}", spec.command, spec.args, spec.cwd.display());
    let mut provider = McpLauncher::new().launch(&spec).await?;

    let tools = provider.list_tools().await?;
    println!("\nDiscovered {} tools:", tools.len());
    for tool in &tools {
        println!("  - {}", tool.name);
        if !tool.description.is_empty() {
            println!("    {}", tool.description);
        }
    }

    if let Ok(name) = std::env::var("PROBE_TOOL") {
        let args = match std::env::var("PROBE_ARGS") {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(_) => serde_json::json!({}),
        };
        println!("\nCalling {name}...");
        match provider.call_tool(&name, args).await {
            Ok(content) => {
                for block in &content {
                    match block.as_text() {
                        Some(text) => println!("  {text}"),
                        None => println!("  <{}>", block.kind),
                    }
                }
            }
            Err(e) => println!("Error: {e}"),
        }
    }

    provider.close().await?;
    println!("\nDone!");
    Ok(())
}
