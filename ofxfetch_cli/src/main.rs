mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ofxfetch_lib::config::DEFAULT_CONFIG_FILE;
use ofxfetch_lib::Config;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "ofxfetch")]
#[command(about = "Download, validate and repair financial statements")]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Output format: table or json
    #[arg(long, default_value = "table", global = true)]
    output: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download statements for every configured account
    Fetch(commands::fetch::FetchArgs),
    /// Write synthetic statements carrying security prices
    Quotes(commands::quotes::QuotesArgs),
    /// Re-run the scrubber on a saved statement
    Scrub(commands::scrub::ScrubArgs),
    /// Check a saved statement's structure
    Validate(commands::validate::ValidateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ofxfetch=info".parse()?),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let format = match cli.output.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    };

    match &cli.command {
        Commands::Fetch(args) => {
            let config = Config::load(&cli.config)?;
            commands::fetch::run(args, &config, &format).await?
        }
        Commands::Quotes(args) => {
            let config = load_or_default(&cli.config)?;
            commands::quotes::run(args, &config, &format)?
        }
        Commands::Scrub(args) => {
            let config = Config::load(&cli.config)?;
            commands::scrub::run(args, &config, &format)?
        }
        Commands::Validate(args) => commands::validate::run(args, &format)?,
    }

    Ok(())
}

/// Quotes need no sites or accounts, so a missing config file means defaults.
fn load_or_default(path: &std::path::Path) -> Result<Config> {
    if path.exists() {
        Ok(Config::load(path)?)
    } else {
        Ok(Config::default())
    }
}
