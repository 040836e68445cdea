//! backport-bot command line

mod cli;

use backport_bot::config::DEFAULT_CONFIG_PATH;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "backport-bot", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve webhooks and run the merge queues
    Serve {
        /// Configuration file
        #[arg(long, short, env = "BACKPORT_BOT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Listen address (overrides `server.address`)
        #[arg(long)]
        addr: Option<String>,
        /// Listen port (overrides `server.port`)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Load and validate a configuration file
    CheckConfig {
        /// Configuration file
        #[arg(long, short, env = "BACKPORT_BOT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Show which branch a label cherry-picks to
    Resolve {
        /// Configuration file
        #[arg(long, short, env = "BACKPORT_BOT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Repository as `owner/repo`
        #[arg(long)]
        repo: String,
        /// Label to resolve
        label: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { config, addr, port } => {
            cli::serve::run_serve(&config, addr.as_deref(), port).await
        }
        Commands::CheckConfig { config } => cli::check::run_check(&config),
        Commands::Resolve {
            config,
            repo,
            label,
        } => cli::resolve::run_resolve(&config, &repo, &label),
    }
}
