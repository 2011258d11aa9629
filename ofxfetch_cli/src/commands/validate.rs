//! The `validate` subcommand.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use ofxfetch_lib::validate_file;
use serde::Serialize;

use crate::output::{print_json, OutputFormat};

#[derive(Args)]
pub struct ValidateArgs {
    /// Statement file to check
    pub file: PathBuf,
}

#[derive(Serialize)]
struct Verdict {
    file: String,
    valid: bool,
    error: Option<String>,
}

pub fn run(args: &ValidateArgs, format: &OutputFormat) -> Result<()> {
    let result = validate_file(&args.file);

    let verdict = Verdict {
        file: args.file.display().to_string(),
        valid: result.is_ok(),
        error: result.as_ref().err().map(|e| e.to_string()),
    };
    match format {
        OutputFormat::Table => {
            if verdict.valid {
                println!("{}: OK", verdict.file);
            }
        }
        OutputFormat::Json => print_json(&verdict),
    }

    result?;
    Ok(())
}
