use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use aura_core::config::{self, Config};
use aura_core::provider;
use aura_core::relay::{self, SessionOptions};
use aura_core::service::http::{serve, AppState, ChatResponse};
use aura_core::tool::ToolRegistry;

#[derive(Parser)]
#[command(
    name = "aura",
    about = format!("{} aura - Gemini chat relay with browser directives", aura_core::LOGO),
    version = aura_core::VERSION,
)]
struct Cli {
    /// Path to config file (default: ~/.aura/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init,
    /// Start the HTTP server
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,
        /// Bind port
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory holding the web front end
        #[arg(long)]
        static_dir: Option<String>,
    },
    /// Send one message through the relay and print the JSON reply
    Ask {
        /// Message to send
        #[arg(required = true)]
        message: Vec<String>,
    },
    /// Show effective configuration
    Status,
    /// Print the declared tools
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("aura=info".parse()?)
                .add_directive("aura_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config_from_env(cli.config.as_deref());

    match cli.command {
        Commands::Init => cmd_init(cli.config.as_deref())?,
        Commands::Serve {
            host,
            port,
            static_dir,
        } => cmd_serve(cfg, host, port, static_dir).await?,
        Commands::Ask { message } => cmd_ask(cfg, message.join(" ")).await?,
        Commands::Status => cmd_status(&cfg, cli.config.as_deref()),
        Commands::Tools => cmd_tools()?,
    }

    Ok(())
}

// ====== Commands ======

fn cmd_init(config_path: Option<&std::path::Path>) -> Result<()> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(config::get_config_path);

    if path.exists() {
        println!("Config already exists at {}", path.display());
        println!("Delete it first to re-initialize.");
        return Ok(());
    }

    config::save_config(&Config::default(), Some(&path))?;
    println!("{} Created config at {}", aura_core::LOGO, path.display());

    println!("\nNext steps:");
    println!("  1. Set API_KEY, or add provider.apiKey to {}", path.display());
    println!("  2. Serve: aura serve --static-dir ./web");
    Ok(())
}

async fn cmd_serve(
    mut cfg: Config,
    host: Option<String>,
    port: Option<u16>,
    static_dir: Option<String>,
) -> Result<()> {
    if let Some(host) = host {
        cfg.server.host = host;
    }
    if let Some(port) = port {
        cfg.server.port = port;
    }
    if let Some(dir) = static_dir {
        cfg.server.static_dir = dir;
    }

    let addr = cfg.listen_addr();
    info!(
        "Model {} via {}, static files from {}",
        cfg.provider.model,
        cfg.api_base(),
        cfg.server.static_dir
    );
    let state = AppState::from_config(cfg)
        .inspect_err(|e| error!("Configuration rejected: {}", e))
        .context("refusing to start")?;

    println!("{} Starting aura on {}...", aura_core::LOGO, addr);
    serve(&addr, Arc::new(state)).await
}

async fn cmd_ask(cfg: Config, message: String) -> Result<()> {
    cfg.validate()?;

    let reply = relay::relay(
        provider::create_provider(&cfg),
        Arc::new(ToolRegistry::with_directives()),
        SessionOptions::from_agent_config(&cfg.provider.model, &cfg.agent),
        &[],
        &message,
    )
    .await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&ChatResponse::from(reply))?
    );
    Ok(())
}

fn cmd_status(cfg: &Config, config_path: Option<&std::path::Path>) {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(config::get_config_path);

    println!("{} aura Status\n", aura_core::LOGO);
    println!(
        "Config: {} {}",
        path.display(),
        if path.exists() { "✓" } else { "✗" }
    );
    println!("Model: {}", cfg.provider.model);
    println!("API base: {}", cfg.api_base());
    println!(
        "API key: {}",
        if cfg.provider.api_key.trim().is_empty() {
            "not set"
        } else {
            "✓"
        }
    );
    println!("Listen: {}", cfg.listen_addr());
    println!("Static dir: {}", cfg.server.static_dir);
    println!("Max tool iterations: {}", cfg.agent.max_tool_iterations);
}

fn cmd_tools() -> Result<()> {
    let registry = ToolRegistry::with_directives();
    let defs = registry.get_definitions();
    println!("{}", serde_json::to_string_pretty(&defs)?);
    Ok(())
}
