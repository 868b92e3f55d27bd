//! Copperkite CLI — the main entry point.
//!
//! Commands:
//! - `demo`   — Run a scripted multi-phase round end to end
//! - `config` — Print the effective configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "copperkite",
    about = "copperkite — tool-orchestrating conversational agent runtime",
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
    /// Run a scripted round against mock lookup tools
    Demo {
        /// The question to ask the scripted assistant
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
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

    match cli.command {
        Commands::Demo { message } => commands::demo::run(message).await?,
        Commands::Config => commands::config_cmd::run()?,
    }

    Ok(())
}
