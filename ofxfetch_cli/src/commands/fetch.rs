//! The `fetch` subcommand: download every configured account's statement.

use anyhow::{bail, Context, Result};
use clap::Args;
use ofxfetch_lib::files::clear_stale_statements;
use ofxfetch_lib::{Client, Config, Fetcher, Scrubber};

use crate::output::{build_statement_rows, print_json, print_statements_table, OutputFormat};

#[derive(Args)]
pub struct FetchArgs {
    /// Days of history to request (default from settings)
    #[arg(long)]
    pub interval: Option<u32>,

    /// Only fetch accounts at this site
    #[arg(long)]
    pub site: Option<String>,
}

pub async fn run(args: &FetchArgs, config: &Config, format: &OutputFormat) -> Result<()> {
    let settings = &config.settings;
    if config.accounts.is_empty() {
        bail!("No accounts configured");
    }

    let removed = clear_stale_statements(&settings.xfr_dir).with_context(|| {
        format!(
            "Failed to clear old statements in {}",
            settings.xfr_dir.display()
        )
    })?;
    if removed > 0 {
        tracing::info!("Removed {} statement(s) from a previous run", removed);
    }

    let scrubber = Scrubber::new(settings.scrub_options())?;
    let mut fetcher = Fetcher::new(Client::new()?, scrubber, settings.xfr_dir.clone());
    let interval = args.interval.unwrap_or(settings.default_interval);

    let summary = fetcher
        .fetch_all(config, interval, args.site.as_deref())
        .await;

    match format {
        OutputFormat::Table => print_statements_table(&summary),
        OutputFormat::Json => print_json(&build_statement_rows(&summary)),
    }

    if summary.outcomes.is_empty() {
        bail!(
            "No accounts matched site {}",
            args.site.as_deref().unwrap_or_default()
        );
    }
    if !summary.success() {
        bail!(
            "{} of {} account(s) failed",
            summary.failures(),
            summary.outcomes.len()
        );
    }
    Ok(())
}
