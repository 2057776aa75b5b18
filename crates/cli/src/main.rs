//! Parley CLI: the main entry point.
//!
//! Commands:
//! - `chat`: Talk to the assistant in a console room
//! - `info`: Show the effective configuration
//! - `platforms`: List configured backends
//! - `models`: List models offered by a backend
//! - `check`: Validate config and probe every backend
//! - `init`: Write a starter config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "parley",
    about = "Parley: a chat-room assistant backed by LLMs",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.parley/config.toml)
    #[arg(short, long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant from the terminal
    Chat,

    /// Show the effective configuration (secrets redacted)
    Info,

    /// List configured backends
    Platforms,

    /// List models offered by a backend
    Models {
        /// Backend name (defaults to the active one)
        #[arg(short, long)]
        backend: Option<String>,
    },

    /// Validate the config and probe every backend
    Check,

    /// Write a starter config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Chat => commands::chat::run(config).await?,
        Commands::Info => commands::info::run(config).await?,
        Commands::Platforms => commands::platforms::run(config).await?,
        Commands::Models { backend } => commands::models::run(config, backend).await?,
        Commands::Check => commands::check::run(config).await?,
        Commands::Init { force } => commands::init::run(config, force).await?,
    }

    Ok(())
}
