//! `openclaw-cursor` command-line entry point.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use openclaw_cursor::{api, auth, logging, Config, ModelRegistry};

#[derive(Parser)]
#[command(name = "openclaw-cursor")]
#[command(about = "HTTP proxy enabling OpenClaw to use Cursor models via cursor-agent")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the proxy in the foreground (default)
    Start {
        /// Port to listen on (overrides config and environment)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Show credentials, cursor-agent location and whether the proxy is running
    Status,
    /// List available models
    Models {
        /// Print the OpenAI-format model list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Send a one-line request through a running proxy
    Test,
    /// Print the version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Start { port: None }) {
        Command::Start { port } => run_start(port).await,
        Command::Status => run_status().await,
        Command::Models { json } => run_models(json),
        Command::Test => run_test().await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run_start(port: Option<u16>) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = port {
        config.port = port;
    }
    logging::init(&config.log_level);
    api::serve(config).await
}

/// Config for client commands; a broken config file falls back to defaults.
fn client_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: {:#}, using defaults", e);
        Config::default()
    })
}

async fn run_status() -> Result<()> {
    let config = client_config();
    let status = auth::status(&config);

    println!("Authentication: {}", status.authenticated);
    if let Some(path) = &status.credential_path {
        println!("Credentials: {}", path.display());
    }
    match &status.cursor_agent {
        Some(path) => println!("cursor-agent: {}", path.display()),
        None => println!("cursor-agent: not found"),
    }

    let url = format!("{}/health", config.base_url());
    match reqwest::get(&url).await {
        Ok(resp) if resp.status().is_success() => {
            println!("Proxy: running on port {}", config.port)
        }
        Ok(resp) => println!("Proxy: unhealthy ({})", resp.status()),
        Err(_) => println!("Proxy: not running"),
    }
    Ok(())
}

fn run_models(as_json: bool) -> Result<()> {
    let registry = ModelRegistry::builtin();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&registry.list_openai())?);
        return Ok(());
    }
    println!("{:<40} {}", "ID", "Name");
    println!("{}", "-".repeat(40));
    for model in registry.iter() {
        println!("{:<40} {}", model.id, model.name);
    }
    Ok(())
}

async fn run_test() -> Result<()> {
    let config = client_config();
    let url = format!("{}/v1/chat/completions", config.base_url());
    let body = json!({
        "model": "cursor/auto",
        "messages": [{"role": "user", "content": "Say 'test' in one word"}],
        "stream": false,
    });

    let resp = reqwest::Client::new()
        .post(&url)
        .json(&body)
        .send()
        .await
        .context("Proxy not reachable. Make sure it is running: openclaw-cursor start")?;

    let status = resp.status();
    let result: Value = resp.json().await.context("Invalid response from proxy")?;
    if !status.is_success() {
        bail!("Request failed (status {}): {}", status, result);
    }

    let content = result["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default();
    println!("Response: {}", content);
    println!("Test passed.");
    Ok(())
}
