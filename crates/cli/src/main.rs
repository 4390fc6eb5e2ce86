//! MedQuery CLI, the main entry point.
//!
//! Commands:
//! - `ask`     Resolve one medication question
//! - `fast`    Try the fast path only
//! - `serve`   Start the HTTP gateway
//! - `config`  Show or initialize configuration
//! - `doctor`  Diagnose catalog, model and config health

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "medquery",
    about = "MedQuery — medication questions answered with explainable traces",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a medication question
    Ask {
        /// The question, e.g. "effets secondaires du doliprane"
        query: String,

        /// Print the answer word by word as it is delivered
        #[arg(short, long)]
        stream: bool,

        /// Print the full response, trace included, as JSON
        #[arg(short, long, conflicts_with = "stream")]
        json: bool,
    },

    /// Resolve with the fast path only (no model call)
    Fast {
        query: String,
    },

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose system health
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ask { query, stream, json } => commands::ask::run(&query, stream, json).await?,
        Commands::Fast { query } => commands::ask::fast(&query).await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Init { force } => commands::config_cmd::init(force).await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
