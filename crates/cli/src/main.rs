//! Kestrel CLI: the main entry point.
//!
//! Commands:
//! - `chat`    interactive session or a single message
//! - `config`  show, locate or create the configuration file
//! - `doctor`  check configuration and provider connectivity

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "kestrel",
    about = "Kestrel, an agentic coding assistant",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file (defaults to ~/.kestrel/config.toml)
    #[arg(long, global = true, env = "KESTREL_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat(commands::chat::ChatArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose configuration and connectivity
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Chat(args) => commands::chat::run(config, args).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config)?,
            ConfigAction::Path => commands::config_cmd::path(config),
            ConfigAction::Init { force } => commands::config_cmd::init(config, force)?,
        },
        Commands::Doctor => commands::doctor::run(config).await?,
    }

    Ok(())
}
