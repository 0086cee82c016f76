//! Pest identification CLI
//!
//! A command-line tool for classifying crop photos and browsing the pest
//! advisory directory of a running pest identification server.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{classify, health, pests};
use std::path::PathBuf;

/// Pest identification CLI
#[derive(Parser)]
#[command(name = "pestid")]
#[command(author, version, about = "CLI for the Pest Identification service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via PESTID_API_URL env var or the config file)
    #[arg(long, env = "PESTID_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Identify the pest in a photo
    Classify {
        /// Path to a JPEG or PNG image
        image: PathBuf,
    },

    /// Browse the pest advisory directory
    #[command(subcommand)]
    Pests(PestsCommands),

    /// Show service health and readiness
    Health,
}

#[derive(Subcommand)]
pub enum PestsCommands {
    /// List all known pests
    List,

    /// Show the full advisory for a pest
    Show {
        /// Pest name, e.g. Beetles
        name: String,
    },
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;
    let format = cli
        .format
        .or_else(|| {
            config
                .default_format
                .as_deref()
                .and_then(output::OutputFormat::from_name)
        })
        .unwrap_or_default();

    let client = client::ApiClient::new(&config.resolve_api_url(cli.api_url))?;

    match cli.command {
        Commands::Classify { image } => {
            classify::classify(&client, &image, format).await?;
        }
        Commands::Pests(pests_cmd) => match pests_cmd {
            PestsCommands::List => {
                pests::list_pests(&client, format).await?;
            }
            PestsCommands::Show { name } => {
                pests::show_pest(&client, &name, format).await?;
            }
        },
        Commands::Health => {
            health::show_health(&client, format).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
