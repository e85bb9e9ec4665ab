//! Switchboard CLI: chat with a model that can call tools on MCP servers.

mod commands;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{SlashResult, handle_slash_command};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use switchboard_api::{ChatClient, ChatCompletionsRuntime};
use switchboard_config::{CliOverrides, SwitchboardConfig};
use switchboard_core::QueryProcessor;
use switchboard_mcp::{InvocationRouter, SessionManager};
use switchboard_types::{Message, SwitchboardError};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(
    name = "switchboard",
    version,
    about = "Chat with a model that can use tools from MCP servers"
)]
struct Cli {
    /// Server to connect: a .py/.js script or an http(s):// event-stream URL
    server: Option<String>,

    /// Model to use
    #[arg(long)]
    model: Option<String>,

    /// Chat-completions endpoint base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = load_config(&cli).context("Failed to load configuration")?;
    tracing::debug!(config_dir = %config.config_dir.display(), "Loaded configuration");

    let mut servers = config.servers.clone();
    if let Some(address) = &cli.server {
        match server::server_entry(address) {
            Ok((id, server_config)) => {
                servers.servers.insert(id, server_config);
            }
            Err(e) => usage_error(&e.to_string()),
        }
    }
    if servers.servers.is_empty() {
        usage_error("no server given and none configured");
    }

    let manager = Arc::new(SessionManager::new());
    server::connect_all(&manager, &servers).await?;

    let names: Vec<String> = manager
        .snapshot()
        .await
        .into_iter()
        .map(|t| t.name)
        .collect();
    eprintln!("\nConnected to server with tools: [{}]", names.join(", "));

    let result = run(&config, Arc::clone(&manager)).await;
    manager.shutdown().await;
    result
}

fn load_config(cli: &Cli) -> Result<SwitchboardConfig, SwitchboardError> {
    let config = SwitchboardConfig::load(CliOverrides {
        model: cli.model.clone(),
        base_url: cli.base_url.clone(),
    })?;
    Ok(config)
}

fn usage_error(message: &str) -> ! {
    eprintln!("Error: {message}");
    eprintln!("{}", server::USAGE);
    std::process::exit(2);
}

async fn run(config: &SwitchboardConfig, manager: Arc<SessionManager>) -> Result<()> {
    let mut client = ChatClient::new(&config.base_url).context("Failed to create model client")?;
    if let Some(key) = &config.api_key {
        client = client.with_api_key(key);
    }
    let runtime = ChatCompletionsRuntime::new(client, &config.model)
        .with_max_tool_rounds(config.max_tool_rounds);

    let router = InvocationRouter::new(Arc::clone(&manager))
        .with_call_timeout(Duration::from_millis(config.call_timeout_ms));
    let mut processor = QueryProcessor::new(Arc::new(runtime), router);
    if let Some(prompt) = &config.system_prompt {
        processor = processor.with_system_prompt(prompt);
    }

    repl(&processor, &manager, config).await
}

async fn repl(
    processor: &QueryProcessor,
    manager: &SessionManager,
    config: &SwitchboardConfig,
) -> Result<()> {
    eprintln!(
        "\nswitchboard v{} (model: {} at {})",
        env!("CARGO_PKG_VERSION"),
        config.model,
        config.base_url
    );
    eprintln!("Type your queries or 'quit' to exit. /help lists commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<Message> = Vec::new();

    loop {
        print!("\nQuery: ");
        io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                break;
            }
        };
        let Some(line) = line else {
            eprintln!();
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("quit") {
            break;
        }

        if let Some(handled) = handle_slash_command(input, manager, &mut history).await {
            match handled {
                SlashResult::Continue => continue,
                SlashResult::Break => break,
                SlashResult::Unknown => {
                    eprintln!("Unknown command: {input}. Type /help for available commands.");
                    continue;
                }
            }
        }

        match processor.process(input, &mut history).await {
            Ok(answer) => println!("\n{answer}"),
            Err(e) => eprintln!("\nError: {e}"),
        }
    }

    Ok(())
}
