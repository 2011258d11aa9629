//! The `scrub` subcommand: repair a statement already on disk.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use ofxfetch_lib::{Config, Scrubber};

use crate::output::{print_json, print_rules_table, OutputFormat};

#[derive(Args)]
pub struct ScrubArgs {
    /// Statement file to rewrite in place
    pub file: PathBuf,

    /// Site the statement was downloaded from
    #[arg(long)]
    pub site: String,

    /// Suppress per-rule log lines
    #[arg(long)]
    pub quiet: bool,
}

pub fn run(args: &ScrubArgs, config: &Config, format: &OutputFormat) -> Result<()> {
    let site = config.site(&args.site)?;
    let mut options = config.settings.scrub_options();
    options.quiet |= args.quiet;

    let report = Scrubber::new(options)?.scrub_file(&args.file, site)?;

    match format {
        OutputFormat::Table => print_rules_table(&report),
        OutputFormat::Json => print_json(&report),
    }
    Ok(())
}
