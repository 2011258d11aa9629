//! Post-download repair of known server defects.
//!
//! The scrubber is an ordered list of [`ScrubRule`]s. Each rule is a
//! self-contained find-and-rewrite pass over the whole statement text, may be
//! a no-op when its trigger is absent, and leaves already-scrubbed text alone.
//! Rules run in this order:
//!
//! 1. [`RuleName::VendorFitid`]: stabilize vendor transaction-id serials (URL-gated)
//! 2. [`RuleName::NullTime`]: midnight/empty times become noon
//! 3. [`RuleName::TimeShift`]: shift `DTASOF` by the site's correction (offset-gated)
//! 4. [`RuleName::RangeEnd`]: add a missing `<DTEND>`
//! 5. [`RuleName::InvestmentSign`]: fix buy/sell quantity and total signs
//! 6. [`RuleName::UnsupportedTags`]: drop tags the importer rejects

mod rules;

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use ofxfetch_api::types::Site;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::rules::{
    InvestmentSign, NullTime, RangeEnd, TimeShift, UnsupportedTags, VendorFitid,
};

/// Stable names for the rules, used in configuration and reports.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuleName {
    VendorFitid,
    NullTime,
    TimeShift,
    RangeEnd,
    InvestmentSign,
    UnsupportedTags,
}

impl fmt::Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleName::VendorFitid => "vendor_fitid",
            RuleName::NullTime => "null_time",
            RuleName::TimeShift => "time_shift",
            RuleName::RangeEnd => "range_end",
            RuleName::InvestmentSign => "investment_sign",
            RuleName::UnsupportedTags => "unsupported_tags",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum ScrubError {
    #[error("scrub pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),
    #[error("scrub failed on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// What a rule needs to know about the statement's origin.
#[derive(Clone, Debug)]
pub struct ScrubContext<'a> {
    pub site_url: &'a str,
    /// Non-zero `DTASOF` correction in hours, if the site declares one.
    pub time_offset: Option<f64>,
    /// Reference time for synthesized values.
    pub now: NaiveDateTime,
}

impl<'a> ScrubContext<'a> {
    pub fn for_site(site: &'a Site) -> Self {
        Self {
            site_url: &site.url,
            time_offset: site.time_shift_hours(),
            now: Local::now().naive_local(),
        }
    }
}

/// Result of running one rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Rewrite {
    Unchanged,
    Changed { text: String, note: String },
    /// The rule saw something it will not guess about; the text is left as is.
    Flagged(String),
}

/// A single text-rewrite pass.
pub trait ScrubRule {
    fn name(&self) -> RuleName;

    /// Whether this rule is relevant for the statement at all. Defaults to always.
    fn applies(&self, _ctx: &ScrubContext<'_>, _text: &str) -> bool {
        true
    }

    fn apply(&self, ctx: &ScrubContext<'_>, text: &str) -> Rewrite;
}

/// Pipeline-level switches.
#[derive(Clone, Debug, Default)]
pub struct ScrubOptions {
    /// Suppress the per-rule log lines. Output bytes are identical either way.
    pub quiet: bool,
    pub disabled: HashSet<RuleName>,
}

/// What a scrub pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScrubReport {
    pub changed: Vec<RuleName>,
    pub warnings: Vec<String>,
}

impl ScrubReport {
    pub fn is_clean(&self) -> bool {
        self.changed.is_empty() && self.warnings.is_empty()
    }
}

/// The ordered rule pipeline.
pub struct Scrubber {
    rules: Vec<Box<dyn ScrubRule>>,
    options: ScrubOptions,
}

impl Scrubber {
    /// Builds the standard six-rule pipeline.
    pub fn new(options: ScrubOptions) -> Result<Self, ScrubError> {
        let rules: Vec<Box<dyn ScrubRule>> = vec![
            Box::new(VendorFitid::new()?),
            Box::new(NullTime::new()?),
            Box::new(TimeShift::new()?),
            Box::new(RangeEnd::new()?),
            Box::new(InvestmentSign::new()?),
            Box::new(UnsupportedTags::new()?),
        ];
        Ok(Self { rules, options })
    }

    /// Runs every enabled, applicable rule in order over `text`.
    pub fn scrub_text(&self, text: &str, ctx: &ScrubContext<'_>) -> (String, ScrubReport) {
        let mut current = text.to_string();
        let mut report = ScrubReport::default();

        for rule in &self.rules {
            let name = rule.name();
            if self.options.disabled.contains(&name) || !rule.applies(ctx, &current) {
                continue;
            }
            match rule.apply(ctx, &current) {
                Rewrite::Unchanged => {}
                Rewrite::Changed { text, note } => {
                    if !self.options.quiet {
                        tracing::info!("+Scrubber: {}", note);
                    }
                    report.changed.push(name);
                    current = text;
                }
                Rewrite::Flagged(warning) => {
                    tracing::warn!("+Scrubber ({}): {}", name, warning);
                    report.warnings.push(warning);
                }
            }
        }

        (current, report)
    }

    /// Scrubs the statement at `path` in place. The file is only rewritten
    /// when some rule changed it.
    pub fn scrub_file(&self, path: &Path, site: &Site) -> Result<ScrubReport, ScrubError> {
        let io_err = |source| ScrubError::Io {
            path: path.to_path_buf(),
            source,
        };
        let bytes = std::fs::read(path).map_err(io_err)?;
        let text = decode_bytes(&bytes);

        let ctx = ScrubContext::for_site(site);
        let (scrubbed, report) = self.scrub_text(&text, &ctx);

        if !report.changed.is_empty() {
            std::fs::write(path, encode_bytes(&scrubbed)).map_err(io_err)?;
        }
        Ok(report)
    }
}

// Statements are usually CP-1252, sometimes UTF-8. Mapping each byte to the
// char of the same value keeps the round trip lossless for either, and every
// pattern the rules match is ASCII.
fn decode_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn encode_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}
