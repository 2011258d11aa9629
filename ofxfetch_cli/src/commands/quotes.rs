//! The `quotes` subcommand: wrap security prices in synthetic statements.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use clap::Args;
use ofxfetch_lib::files::QUOTE_HISTORY_FILE;
use ofxfetch_lib::ofxfetch_api::timestamp::Timestamp;
use ofxfetch_lib::synthetic::write_quote_files;
use ofxfetch_lib::{Config, Security, SecurityKind, SyntheticStatementWriter};
use serde::Deserialize;

use crate::output::{build_quote_rows, print_json, print_quotes_table, OutputFormat};

#[derive(Args)]
pub struct QuotesArgs {
    /// CSV with columns ticker,symbol,name,price,kind,quote_time[,zone]
    #[arg(long)]
    pub input: PathBuf,

    /// Also write a small-share document to force a price update
    #[arg(long)]
    pub force: bool,

    /// Multiply every price by this factor
    #[arg(long, default_value = "1")]
    pub multiplier: f64,
}

/// One input row. `quote_time` is `YYYYMMDDHHMMSS`, optionally with a
/// bracketed zone.
#[derive(Deserialize, Debug)]
struct QuoteInput {
    ticker: String,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    name: String,
    price: f64,
    kind: SecurityKind,
    quote_time: String,
    #[serde(default)]
    zone: Option<String>,
}

impl QuoteInput {
    fn into_security(self, multiplier: f64) -> Result<Security> {
        let ts = Timestamp::parse(&self.quote_time).ok_or_else(|| {
            anyhow!(
                "Invalid quote_time '{}' for {}: expected YYYYMMDDHHMMSS",
                self.quote_time,
                self.ticker
            )
        })?;
        let symbol = self
            .symbol
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.ticker.clone());
        Ok(Security {
            symbol: symbol.trim().to_uppercase(),
            ticker: self.ticker,
            name: self.name,
            price: self.price * multiplier,
            quote_time: ts.datetime,
            zone: self.zone.filter(|z| !z.trim().is_empty()).or(ts.zone),
            kind: self.kind,
        })
    }
}

fn read_securities(path: &Path, multiplier: f64) -> Result<Vec<Security>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut securities = Vec::new();
    for (i, row) in reader.deserialize::<QuoteInput>().enumerate() {
        let row = row.with_context(|| format!("{}: bad row {}", path.display(), i + 1))?;
        securities.push(row.into_security(multiplier)?);
    }
    Ok(securities)
}

/// `MM/DD/YYYY HH:MM:SS`
fn history_time(security: &Security) -> String {
    security.quote_time.format("%m/%d/%Y %H:%M:%S").to_string()
}

/// Appends one row per security to the quote history, writing the header
/// only when the file is new.
fn append_history(path: &Path, securities: &[Security]) -> Result<()> {
    let is_new = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if is_new {
        wtr.write_record(["Symbol", "Name", "Price", "Date/Time"])?;
    }
    for s in securities {
        wtr.write_record([
            s.symbol.clone(),
            s.display_name(),
            s.price.to_string(),
            history_time(s),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn run(args: &QuotesArgs, config: &Config, format: &OutputFormat) -> Result<()> {
    let settings = &config.settings;
    let securities = read_securities(&args.input, args.multiplier)?;
    if securities.is_empty() {
        bail!("No quotes in {}", args.input.display());
    }

    let mut writer =
        SyntheticStatementWriter::new(&settings.quote_currency, &settings.quote_account);
    let force = args.force || settings.force_quotes;
    let files = write_quote_files(
        &settings.xfr_dir,
        &mut writer,
        &securities,
        force,
        Local::now().naive_local(),
    )
    .with_context(|| format!("Failed to write quotes to {}", settings.xfr_dir.display()))?
    .ok_or_else(|| anyhow!("No quote statement written"))?;

    if settings.save_quote_history {
        let history = settings.xfr_dir.join(QUOTE_HISTORY_FILE);
        tracing::info!("Appending quote results to {}", history.display());
        append_history(&history, &securities)?;
    }

    match format {
        OutputFormat::Table => print_quotes_table(&securities, &files),
        OutputFormat::Json => print_json(&serde_json::json!({
            "quotes": build_quote_rows(&securities),
            "files": files,
        })),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ofxfetch-cli-{}-{}", std::process::id(), name))
    }

    #[test]
    fn reads_quote_csv() {
        let path = scratch("in.csv");
        std::fs::write(
            &path,
            "ticker,symbol,name,price,kind,quote_time,zone\n\
             aapl,,Apple Inc.,189.5,stock,20240315160000,[-5:EST]\n\
             VFIAX,VFIAX,Vanguard 500,450.25,mf,20240314160000.000,\n",
        )
        .unwrap();

        let securities = read_securities(&path, 1.0).unwrap();
        assert_eq!(securities.len(), 2);
        assert_eq!(securities[0].symbol, "AAPL");
        assert_eq!(securities[0].zone.as_deref(), Some("[-5:EST]"));
        assert_eq!(securities[0].quote_timestamp(), "20240315160000[-5:EST]");
        assert_eq!(securities[1].kind, SecurityKind::MutualFund);
        assert!(securities[1].zone.is_none());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn multiplier_scales_prices() {
        let path = scratch("mult.csv");
        std::fs::write(
            &path,
            "ticker,symbol,name,price,kind,quote_time\nX,X,X,2.5,stock,20240315160000\n",
        )
        .unwrap();
        let securities = read_securities(&path, 100.0).unwrap();
        assert_eq!(securities[0].price, 250.0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn bad_quote_time_is_an_error() {
        let path = scratch("bad.csv");
        std::fs::write(
            &path,
            "ticker,symbol,name,price,kind,quote_time\nX,X,X,1,stock,2024-03-15\n",
        )
        .unwrap();
        let err = read_securities(&path, 1.0).unwrap_err();
        assert!(err.to_string().contains("Invalid quote_time"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn history_header_is_written_once() {
        let path = scratch("history.csv");
        std::fs::remove_file(&path).ok();
        let security = Security {
            ticker: "AAPL".to_string(),
            symbol: "AAPL".to_string(),
            name: "Apple Inc.".to_string(),
            price: 189.5,
            quote_time: Timestamp::parse("20240315160000").unwrap().datetime,
            zone: None,
            kind: SecurityKind::Stock,
        };

        append_history(&path, &[security.clone()]).unwrap();
        append_history(&path, &[security]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Symbol,Name,Price,Date/Time");
        assert_eq!(lines[1], "AAPL,Apple Inc.,189.5,03/15/2024 16:00:00");
        std::fs::remove_file(&path).ok();
    }
}
