//! Locally built investment statements carrying security prices.
//!
//! The importer only picks up prices from statements, so quotes obtained
//! elsewhere are wrapped in a complete, already-valid document: a successful
//! sign-on, an investment statement with one position per security, and the
//! matching security list. Nothing here touches the network.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use ofxfetch_api::message::document_header;
use ofxfetch_api::timestamp::{format_timestamp, noon};
use ofxfetch_api::{Node, UidGenerator};
use serde::{Deserialize, Serialize};

use crate::files::{ensure_dir, quote_path};

/// Broker id written into synthetic statements.
pub const SYNTHETIC_BROKER_ID: &str = "ofxfetch";

/// Share count of the second document produced when forcing a price update.
pub const FORCE_SHARES: f64 = 0.001;

const SYNTHETIC_VERSION: &str = "102";
const PROFILE_UPDATED: &str = "20010918083000";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SecurityKind {
    Stock,
    #[serde(alias = "mf", alias = "fund")]
    MutualFund,
}

/// A priced security, as supplied by the quote source.
#[derive(Clone, Debug, PartialEq)]
pub struct Security {
    pub ticker: String,
    /// Symbol used as the security's unique id in the document.
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub quote_time: NaiveDateTime,
    /// Bracketed zone annotation appended to the quote time, e.g. `[-5:EST]`.
    pub zone: Option<String>,
    pub kind: SecurityKind,
}

impl Security {
    /// The quote time in protocol form, including the zone annotation.
    pub fn quote_timestamp(&self) -> String {
        format!(
            "{}{}",
            format_timestamp(self.quote_time),
            self.zone.as_deref().unwrap_or_default()
        )
    }

    /// The name restricted to characters the importer accepts; the ticker when
    /// nothing is left.
    pub fn display_name(&self) -> String {
        let cleaned: String = self
            .name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | ',' | '.' | '-'))
            .collect();
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            self.ticker.clone()
        } else {
            cleaned.to_string()
        }
    }
}

/// Builds synthetic statements for one quote account.
pub struct SyntheticStatementWriter {
    currency: String,
    account: String,
    uids: UidGenerator,
}

impl SyntheticStatementWriter {
    pub fn new(currency: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            account: account.into(),
            uids: UidGenerator::new(),
        }
    }

    pub fn with_uids(mut self, uids: UidGenerator) -> Self {
        self.uids = uids;
        self
    }

    /// Builds a complete document holding `shares` of every security.
    pub fn build(&mut self, securities: &[Security], shares: f64, now: NaiveDateTime) -> String {
        let dtasof = statement_as_of(securities, now);
        let ordered = ordered(securities);

        let body = Node::tag("OFX")
            .child(sign_on_response(now))
            .child(
                Node::tag("INVSTMTMSGSRSV1").child(
                    Node::tag("INVSTMTTRNRS")
                        .field("TRNUID", self.uids.next_uid())
                        .child(status())
                        .field("CLTCOOKIE", "4")
                        .child(self.statement(&ordered, shares, &dtasof)),
                ),
            )
            .child(
                Node::tag("SECLISTMSGSRSV1").child(
                    Node::tag("SECLIST")
                        .children(ordered.iter().map(|s| security_info(s, &dtasof))),
                ),
            )
            .build();

        let header = document_header(SYNTHETIC_VERSION, &self.uids.next_uid());
        format!("{}\r\n{}", header, body.render())
    }

    /// A zero-share document, plus a [`FORCE_SHARES`] variant when `force` is
    /// set. The importer should receive the forced document first.
    pub fn build_pair(
        &mut self,
        securities: &[Security],
        force: bool,
        now: NaiveDateTime,
    ) -> (String, Option<String>) {
        let primary = self.build(securities, 0.0, now);
        let forced = force.then(|| self.build(securities, FORCE_SHARES, now));
        (primary, forced)
    }

    fn statement(&self, securities: &[&Security], shares: f64, dtasof: &str) -> Node {
        Node::tag("INVSTMTRS")
            .field("DTASOF", dtasof)
            .field("CURDEF", &self.currency)
            .child(
                Node::tag("INVACCTFROM")
                    .field("BROKERID", SYNTHETIC_BROKER_ID)
                    .field("ACCTID", &self.account),
            )
            .child(
                Node::tag("INVTRANLIST")
                    .field("DTSTART", dtasof)
                    .field("DTEND", dtasof),
            )
            .child(
                Node::tag("INVPOSLIST")
                    .children(securities.iter().map(|s| position(s, shares))),
            )
            .build()
    }
}

/// The statement's as-of time: the latest quote time not in the future,
/// or today at noon when there is none.
pub fn statement_as_of(securities: &[Security], now: NaiveDateTime) -> String {
    securities
        .iter()
        .filter(|s| s.quote_time <= now)
        .max_by_key(|s| s.quote_time)
        .map(Security::quote_timestamp)
        .unwrap_or_else(|| format_timestamp(noon(now.date())))
}

/// Quote documents written to disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteFiles {
    /// Zero-share document.
    pub primary: PathBuf,
    /// Small-share document, present when forcing a price update.
    pub forced: Option<PathBuf>,
}

impl QuoteFiles {
    /// The order the importer must receive the files in.
    pub fn import_order(&self) -> Vec<&Path> {
        self.forced
            .iter()
            .map(PathBuf::as_path)
            .chain(std::iter::once(self.primary.as_path()))
            .collect()
    }
}

/// Writes the quote document(s) for `securities` under `dir`. Returns `None`
/// without touching the disk when there is nothing to write.
pub fn write_quote_files(
    dir: &Path,
    writer: &mut SyntheticStatementWriter,
    securities: &[Security],
    force: bool,
    now: NaiveDateTime,
) -> std::io::Result<Option<QuoteFiles>> {
    if securities.is_empty() {
        return Ok(None);
    }
    ensure_dir(dir)?;

    let (primary_doc, forced_doc) = writer.build_pair(securities, force, now);
    let primary = quote_path(dir, now);
    std::fs::write(&primary, primary_doc)?;

    let forced = match forced_doc {
        Some(doc) => {
            let path = quote_path(dir, now);
            std::fs::write(&path, doc)?;
            Some(path)
        }
        None => None,
    };

    tracing::info!(
        "Wrote quotes for {} securities to {}",
        securities.len(),
        primary.display()
    );
    Ok(Some(QuoteFiles { primary, forced }))
}

fn ordered(securities: &[Security]) -> Vec<&Security> {
    let stocks = securities.iter().filter(|s| s.kind == SecurityKind::Stock);
    let funds = securities.iter().filter(|s| s.kind == SecurityKind::MutualFund);
    stocks.chain(funds).collect()
}

fn status() -> Node {
    Node::tag("STATUS")
        .field("CODE", "0")
        .field("SEVERITY", "INFO")
        .build()
}

fn sign_on_response(now: NaiveDateTime) -> Node {
    Node::tag("SIGNONMSGSRSV1")
        .child(
            Node::tag("SONRS")
                .child(
                    Node::tag("STATUS")
                        .field("CODE", "0")
                        .field("SEVERITY", "INFO")
                        .field("MESSAGE", "Successful Sign On"),
                )
                .field("DTSERVER", format_timestamp(now))
                .field("LANGUAGE", "ENG")
                .field("DTPROFUP", PROFILE_UPDATED)
                .child(Node::tag("FI").field("ORG", SYNTHETIC_BROKER_ID)),
        )
        .build()
}

fn security_id(security: &Security) -> Node {
    Node::tag("SECID")
        .field("UNIQUEID", &security.symbol)
        .field("UNIQUEIDTYPE", "TICKER")
        .build()
}

fn position(security: &Security, shares: f64) -> Node {
    let tag = match security.kind {
        SecurityKind::Stock => "POSSTOCK",
        SecurityKind::MutualFund => "POSMF",
    };
    Node::tag(tag)
        .child(
            Node::tag("INVPOS")
                .child(security_id(security))
                .field("HELDINACCT", "CASH")
                .field("POSTYPE", "LONG")
                .field("UNITS", format_number(shares))
                .field("UNITPRICE", format_number(security.price))
                .field("MKTVAL", format_number(security.price * shares))
                .field("DTPRICEASOF", security.quote_timestamp()),
        )
        .build()
}

fn security_info(security: &Security, dtasof: &str) -> Node {
    let info = Node::tag("SECINFO")
        .child(security_id(security))
        .field("SECNAME", security.display_name())
        .field("TICKER", &security.symbol)
        .field("UNITPRICE", format_number(security.price))
        .field("DTASOF", dtasof);
    match security.kind {
        SecurityKind::Stock => Node::tag("STOCKINFO").child(info).build(),
        SecurityKind::MutualFund => Node::tag("MFINFO")
            .child(info)
            .field("MFTYPE", "OPENEND")
            .build(),
    }
}

/// Decimal text with at most six fractional digits and no trailing zeros.
fn format_number(value: f64) -> String {
    let rounded = (value * 1e6).round() / 1e6;
    if rounded == 0.0 || !rounded.is_finite() {
        return "0".to_string();
    }
    let text = format!("{:.6}", rounded);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::validation::validate_text;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn security(ticker: &str, price: f64, quote_time: NaiveDateTime, kind: SecurityKind) -> Security {
        Security {
            ticker: ticker.to_string(),
            symbol: ticker.to_string(),
            name: format!("{} Holdings, Inc.", ticker),
            price,
            quote_time,
            zone: None,
            kind,
        }
    }

    fn writer() -> SyntheticStatementWriter {
        SyntheticStatementWriter::new("USD", "0123456789").with_uids(UidGenerator::seeded(1))
    }

    #[test]
    fn as_of_is_latest_quote_not_after_now() {
        let now = at(15, 18, 0);
        let t1 = at(14, 16, 0);
        let t2 = at(15, 16, 0);
        let secs = vec![
            security("AAA", 10.0, t2, SecurityKind::Stock),
            security("BBB", 20.0, t1, SecurityKind::MutualFund),
        ];
        assert_eq!(statement_as_of(&secs, now), format_timestamp(t2));

        let doc = writer().build(&secs, 0.0, now);
        assert!(doc.contains(&format!("<INVSTMTRS><DTASOF>{}", format_timestamp(t2))));
    }

    #[test]
    fn future_quotes_are_ignored_and_default_is_noon() {
        let now = at(15, 8, 0);
        let secs = vec![security("AAA", 10.0, at(16, 9, 0), SecurityKind::Stock)];
        assert_eq!(statement_as_of(&secs, now), "20240315120000");
        assert_eq!(statement_as_of(&[], now), "20240315120000");
    }

    #[test]
    fn as_of_carries_zone_annotation() {
        let now = at(15, 18, 0);
        let mut s = security("AAA", 10.0, at(15, 16, 0), SecurityKind::Stock);
        s.zone = Some("[-5:EST]".to_string());
        assert_eq!(statement_as_of(&[s], now), "20240315160000[-5:EST]");
    }

    #[test]
    fn document_passes_validation() {
        let now = at(15, 18, 0);
        let secs = vec![
            security("AAA", 10.0, at(15, 16, 0), SecurityKind::Stock),
            security("FUNDX", 20.5, at(15, 16, 0), SecurityKind::MutualFund),
        ];
        let doc = writer().build(&secs, 0.0, now);
        validate_text(&doc, Path::new("quotes.ofx")).unwrap();
        assert!(doc.starts_with("OFXHEADER:100\r\n"));
        assert!(doc.contains("<MFINFO><SECINFO>"));
        assert!(doc.contains("<MFTYPE>OPENEND</MFINFO>"));
        assert!(doc.contains("<BROKERID>ofxfetch<ACCTID>0123456789"));
    }

    #[test]
    fn market_value_is_price_times_shares() {
        let now = at(15, 18, 0);
        let secs = vec![security("AAA", 123.45, at(15, 16, 0), SecurityKind::Stock)];
        let doc = writer().build(&secs, FORCE_SHARES, now);
        assert!(doc.contains("<UNITS>0.001<UNITPRICE>123.45<MKTVAL>0.12345<"));

        let zero = writer().build(&secs, 0.0, now);
        assert!(zero.contains("<UNITS>0<UNITPRICE>123.45<MKTVAL>0<"));
    }

    #[test]
    fn stocks_precede_funds() {
        let now = at(15, 18, 0);
        let secs = vec![
            security("FUNDX", 20.0, at(15, 16, 0), SecurityKind::MutualFund),
            security("AAA", 10.0, at(15, 16, 0), SecurityKind::Stock),
        ];
        let doc = writer().build(&secs, 0.0, now);
        let stock = doc.find("<POSSTOCK>").unwrap();
        let fund = doc.find("<POSMF>").unwrap();
        assert!(stock < fund);
        assert!(doc.find("<STOCKINFO>").unwrap() < doc.find("<MFINFO>").unwrap());
    }

    #[test]
    fn forced_pair_differs_only_in_shares() {
        let now = at(15, 18, 0);
        let secs = vec![security("AAA", 10.0, at(15, 16, 0), SecurityKind::Stock)];
        let (primary, forced) = writer().build_pair(&secs, true, now);
        assert!(primary.contains("<UNITS>0<"));
        assert!(forced.unwrap().contains("<UNITS>0.001<"));
        let (_, none) = writer().build_pair(&secs, false, now);
        assert!(none.is_none());
    }

    #[test]
    fn quote_files_are_written_forced_first() {
        let dir = std::env::temp_dir().join(format!("ofxfetch-quotes-{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        let now = at(15, 18, 0);
        let secs = vec![security("AAA", 10.0, at(15, 16, 0), SecurityKind::Stock)];

        let files = write_quote_files(&dir, &mut writer(), &secs, true, now)
            .unwrap()
            .unwrap();
        let forced = files.forced.clone().unwrap();
        assert_ne!(forced, files.primary);
        assert_eq!(files.import_order(), vec![forced.as_path(), files.primary.as_path()]);
        let text = std::fs::read_to_string(&files.primary).unwrap();
        assert!(text.contains("<UNITS>0<"));

        assert!(write_quote_files(&dir, &mut writer(), &[], true, now)
            .unwrap()
            .is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn names_are_cleaned() {
        let mut s = security("AAA", 1.0, at(1, 0, 0), SecurityKind::Stock);
        s.name = "Acme & Sons (Class A), Inc.".to_string();
        assert_eq!(s.display_name(), "Acme  Sons Class A, Inc.");
        s.name = "&&".to_string();
        assert_eq!(s.display_name(), "AAA");
    }

    #[test]
    fn numbers_are_trimmed() {
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(-0.0000001), "0");
        assert_eq!(format_number(-2.5), "-2.5");
    }
}
