use ofxfetch_lib::scrubber::ScrubReport;
use ofxfetch_lib::{QuoteFiles, RunSummary, Security};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Clone, Debug)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled, Serialize)]
pub struct StatementRow {
    #[tabled(rename = "Site")]
    #[serde(rename = "Site")]
    site: String,
    #[tabled(rename = "Account")]
    #[serde(rename = "Account")]
    account: String,
    #[tabled(rename = "Status")]
    #[serde(rename = "Status")]
    status: String,
    #[tabled(rename = "File")]
    #[serde(rename = "File")]
    file: String,
    #[tabled(rename = "Scrubbed")]
    #[serde(rename = "Scrubbed")]
    scrubbed: String,
}

#[derive(Tabled, Serialize)]
pub struct QuoteRow {
    #[tabled(rename = "Symbol")]
    #[serde(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Name")]
    #[serde(rename = "Name")]
    name: String,
    #[tabled(rename = "Price")]
    #[serde(rename = "Price")]
    price: String,
    #[tabled(rename = "Quote Time")]
    #[serde(rename = "Quote Time")]
    quote_time: String,
}

#[derive(Tabled, Serialize)]
pub struct RuleRow {
    #[tabled(rename = "Rule")]
    #[serde(rename = "Rule")]
    rule: String,
    #[tabled(rename = "Result")]
    #[serde(rename = "Result")]
    result: String,
}

/// Short account label. Only the last four characters of a number are shown.
fn mask_account(number: &str) -> String {
    let number = number.trim();
    if number.is_empty() {
        return "(discovery)".to_string();
    }
    let count = number.chars().count();
    if count <= 4 {
        return number.to_string();
    }
    let tail: String = number.chars().skip(count - 4).collect();
    format!("...{}", tail)
}

fn join_rules(report: &ScrubReport) -> String {
    report
        .changed
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn build_statement_rows(summary: &RunSummary) -> Vec<StatementRow> {
    summary
        .outcomes
        .iter()
        .map(|o| match &o.result {
            Ok(statement) => StatementRow {
                site: o.site.clone(),
                account: mask_account(&o.number),
                status: "OK".to_string(),
                file: statement.path.display().to_string(),
                scrubbed: join_rules(&statement.scrub),
            },
            Err(e) => StatementRow {
                site: o.site.clone(),
                account: mask_account(&o.number),
                status: format!("FAILED: {}", e),
                file: e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                scrubbed: String::new(),
            },
        })
        .collect()
}

pub fn build_quote_rows(securities: &[Security]) -> Vec<QuoteRow> {
    securities
        .iter()
        .map(|s| QuoteRow {
            symbol: s.symbol.clone(),
            name: s.display_name(),
            price: s.price.to_string(),
            quote_time: s.quote_timestamp(),
        })
        .collect()
}

pub fn build_rule_rows(report: &ScrubReport) -> Vec<RuleRow> {
    report
        .changed
        .iter()
        .map(|r| RuleRow {
            rule: r.to_string(),
            result: "changed".to_string(),
        })
        .chain(report.warnings.iter().map(|w| RuleRow {
            rule: "warning".to_string(),
            result: w.clone(),
        }))
        .collect()
}

pub fn print_statements_table(summary: &RunSummary) {
    let mut table = Table::new(build_statement_rows(summary));
    table.with(Style::rounded());
    println!("{}", table);
}

pub fn print_quotes_table(securities: &[Security], files: &QuoteFiles) {
    println!("{}", Table::new(build_quote_rows(securities)));
    for path in files.import_order() {
        println!("{}", path.display());
    }
}

pub fn print_rules_table(report: &ScrubReport) {
    if report.is_clean() {
        println!("No changes.");
    } else {
        println!("{}", Table::new(build_rule_rows(report)));
    }
}

pub fn print_json<T: serde::Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}
