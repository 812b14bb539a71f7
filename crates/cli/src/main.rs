//! Synapse CLI, the main entry point.
//!
//! Commands:
//! - `serve`   Start the HTTP gateway
//! - `chat`    Run the agent once from the terminal
//! - `status`  Show configuration and loaded tools
//! - `doctor`  Check API key and RAG reachability

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use synapse_config::AppConfig;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "synapse",
    about = "Synapse agents: AI troubleshooting over infrastructure and documentation",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file (defaults to ./synapse.toml)
    #[arg(short, long, global = true, env = "SYNAPSE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send a single message to the agent
    Chat {
        /// The message to send
        #[arg(short, long)]
        message: String,

        /// Session id to attach the message to
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Show configuration and tool registry
    Status,

    /// Diagnose configuration and connectivity
    Doctor,
}

fn init_tracing(config: &AppConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };

    if config.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())
        .map_err(|e| format!("Failed to load config: {e}"))?;
    init_tracing(&config, cli.verbose);
    tracing::debug!(config = ?config, "Loaded configuration");

    match cli.command {
        Commands::Serve { port } => commands::serve::run(config, port).await?,
        Commands::Chat { message, session } => commands::chat::run(config, message, session).await?,
        Commands::Status => commands::status::run(config).await?,
        Commands::Doctor => commands::doctor::run(config).await?,
    }

    Ok(())
}
