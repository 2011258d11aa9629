use std::collections::HashSet;
use std::ops::Range;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use ofxfetch_api::timestamp::{format_timestamp, Timestamp, DATE_FORMAT};
use regex::{Captures, Regex};

use super::{Rewrite, RuleName, ScrubContext, ScrubRule};

/// Site URL token identifying the vendor whose transaction ids carry an unstable serial.
const VENDOR_URL_TOKEN: &str = "DISCOVERCARD";

/// Width of the vendor serial suffix.
const SERIAL_DIGITS: usize = 5;

/// Replacement serials are searched below this bound.
const MAX_SERIAL: u32 = 10_000;

/// Tags the importer refuses, removed together with their values.
const UNSUPPORTED_TAGS: &[&str] = &["CORRECTACTION", "CORRECTFITID"];

/// Marker comment left by [`TimeShift`] so a second pass does not shift again.
const SHIFT_MARKER: &str = "<!--ofxfetch:dtasof-shift";

// ---------------------------------------------------------------------------

/// Replaces the vendor's per-download serial on `FITID` values with the
/// smallest serial not already used by the same base id earlier in the file.
///
/// Vendor ids look like `YYYYMMDD` + amount + a 5-digit serial that changes on
/// every download, so the same transaction shows up under different ids.
pub struct VendorFitid {
    fitid: Regex,
}

impl VendorFitid {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            fitid: Regex::new(r"(?i)(<FITID>)([^<\s]+)")?,
        })
    }
}

impl ScrubRule for VendorFitid {
    fn name(&self) -> RuleName {
        RuleName::VendorFitid
    }

    fn applies(&self, ctx: &ScrubContext<'_>, _text: &str) -> bool {
        ctx.site_url.to_ascii_uppercase().contains(VENDOR_URL_TOKEN)
    }

    fn apply(&self, _ctx: &ScrubContext<'_>, text: &str) -> Rewrite {
        let mut assigned: HashSet<String> = HashSet::new();
        let mut changed = false;

        let out = self.fitid.replace_all(text, |caps: &Captures| {
            let tag = &caps[1];
            let id = &caps[2];
            let Some(base) = serial_base(id) else {
                return format!("{}{}", tag, id);
            };

            let mut serial = 0;
            let mut candidate = format!("{}{:05}", base, serial);
            while serial + 1 < MAX_SERIAL && assigned.contains(&candidate) {
                serial += 1;
                candidate = format!("{}{:05}", base, serial);
            }
            if candidate != id {
                changed = true;
            }
            let replacement = format!("{}{}", tag, candidate);
            assigned.insert(candidate);
            replacement
        });

        if changed {
            Rewrite::Changed {
                text: out.into_owned(),
                note: "Processing vendor statement (transaction id serials renumbered).".into(),
            }
        } else {
            Rewrite::Unchanged
        }
    }
}

/// The id without its trailing serial, when it has one.
fn serial_base(id: &str) -> Option<&str> {
    if id.len() <= SERIAL_DIGITS {
        return None;
    }
    let split = id.len() - SERIAL_DIGITS;
    if !id.is_char_boundary(split) {
        return None;
    }
    let (base, serial) = id.split_at(split);
    serial.bytes().all(|b| b.is_ascii_digit()).then_some(base)
}

// ---------------------------------------------------------------------------

/// Rewrites datetime values with an empty or all-zero time of day to noon on
/// the same date, so the calendar date survives any time-zone interpretation.
pub struct NullTime {
    datetime: Regex,
}

impl NullTime {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            datetime: Regex::new(r"(?i)(<DT[A-Z0-9]*>)([^<\s]+)")?,
        })
    }
}

impl ScrubRule for NullTime {
    fn name(&self) -> RuleName {
        RuleName::NullTime
    }

    fn apply(&self, _ctx: &ScrubContext<'_>, text: &str) -> Rewrite {
        // A shifted DTASOF may land on midnight on purpose.
        let shifted = text.contains(SHIFT_MARKER);
        let mut changed = false;
        let out = self.datetime.replace_all(text, |caps: &Captures| {
            let tag = &caps[1];
            let value = &caps[2];
            if shifted && tag.eq_ignore_ascii_case("<DTASOF>") {
                return format!("{}{}", tag, value);
            }
            match noon_value(value) {
                Some(noon) => {
                    changed = true;
                    format!("{}{}", tag, noon)
                }
                None => format!("{}{}", tag, value),
            }
        });

        if changed {
            Rewrite::Changed {
                text: out.into_owned(),
                note: "Null time values updated.".into(),
            }
        } else {
            Rewrite::Unchanged
        }
    }
}

/// `YYYYMMDD120000` when `value` has an empty or `000000` time of day.
fn noon_value(value: &str) -> Option<String> {
    let date = value.get(..8)?;
    if !date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if value.len() == 8 || value.get(8..14) == Some("000000") {
        Some(format!("{}120000", date))
    } else {
        None
    }
}

// ---------------------------------------------------------------------------

/// Shifts every `DTASOF` value by the site's declared correction.
///
/// Fractional seconds are dropped before shifting and the zone annotation is
/// kept verbatim. A marker comment is inserted after `<OFX>` recording the
/// shift; when the marker is already present the rule does nothing.
pub struct TimeShift {
    asof: Regex,
    root: Regex,
}

impl TimeShift {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            asof: Regex::new(r"(?i)(<DTASOF>)([^<\s]+)")?,
            root: Regex::new(r"(?i)<OFX>")?,
        })
    }
}

impl ScrubRule for TimeShift {
    fn name(&self) -> RuleName {
        RuleName::TimeShift
    }

    fn applies(&self, ctx: &ScrubContext<'_>, _text: &str) -> bool {
        ctx.time_offset.is_some_and(|h| h != 0.0)
    }

    fn apply(&self, ctx: &ScrubContext<'_>, text: &str) -> Rewrite {
        let Some(hours) = ctx.time_offset else {
            return Rewrite::Unchanged;
        };
        if text.contains(SHIFT_MARKER) || !self.asof.is_match(text) {
            return Rewrite::Unchanged;
        }

        let Some(delta) = shift_delta(hours) else {
            return Rewrite::Flagged(format!(
                "time offset of {} hours is out of range; DTASOF left unchanged",
                hours
            ));
        };

        let mut overflow = false;
        let shifted = self.asof.replace_all(text, |caps: &Captures| {
            let tag = &caps[1];
            let value = &caps[2];
            let Some(ts) = Timestamp::parse(value) else {
                return format!("{}{}", tag, value);
            };
            match ts.datetime.checked_add_signed(delta) {
                Some(datetime) => format!(
                    "{}{}{}",
                    tag,
                    format_timestamp(datetime),
                    ts.zone.unwrap_or_default()
                ),
                None => {
                    overflow = true;
                    format!("{}{}", tag, value)
                }
            }
        });
        if overflow {
            return Rewrite::Flagged(format!(
                "shifting DTASOF by {} hours leaves the calendar; DTASOF left unchanged",
                hours
            ));
        }

        let marker = format!("{}={}-->", SHIFT_MARKER, hours);
        let mut out = shifted.into_owned();
        match self.root.find(&out) {
            Some(m) => out.insert_str(m.end(), &marker),
            None => out.push_str(&marker),
        }

        Rewrite::Changed {
            text: out,
            note: format!("Shifting DTASOF time values {} hours.", hours),
        }
    }
}

/// Whole seconds for a shift of `hours`, when that is a representable duration.
fn shift_delta(hours: f64) -> Option<TimeDelta> {
    let seconds = (hours * 3600.0).round();
    if !seconds.is_finite() || seconds.abs() >= i64::MAX as f64 {
        return None;
    }
    TimeDelta::try_seconds(seconds as i64)
}

// ---------------------------------------------------------------------------

/// Adds a `<DTEND>` right after a statement's `<DTSTART>` value when the
/// document has no `<DTEND>` at all. The synthesized end is the current time
/// (to the minute), never earlier than the start.
///
/// Only a single range per document is handled; several unmatched starts are
/// reported and left alone.
pub struct RangeEnd {
    start: Regex,
    end: Regex,
}

impl RangeEnd {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            start: Regex::new(r"(?i)<DTSTART>([^<\s]+)")?,
            end: Regex::new(r"(?i)<DTEND>")?,
        })
    }
}

impl ScrubRule for RangeEnd {
    fn name(&self) -> RuleName {
        RuleName::RangeEnd
    }

    fn apply(&self, ctx: &ScrubContext<'_>, text: &str) -> Rewrite {
        if self.end.is_match(text) {
            return Rewrite::Unchanged;
        }
        let starts: Vec<Captures> = self.start.captures_iter(text).collect();
        let start = match starts.as_slice() {
            [] => return Rewrite::Unchanged,
            [one] => one,
            many => {
                return Rewrite::Flagged(format!(
                    "{} <DTSTART> fields without any <DTEND>; multiple statement ranges are not repaired",
                    many.len()
                ))
            }
        };

        let (Some(whole), Some(value)) = (start.get(0), start.get(1)) else {
            return Rewrite::Unchanged;
        };
        let now = ctx.now.with_second(0).unwrap_or(ctx.now).with_nanosecond(0).unwrap_or(ctx.now);
        let begin = parse_start(value.as_str());
        let mut end = match begin {
            Some(begin) if begin > now => begin,
            _ => now,
        };
        // Keep a midnight end out of reach of the null-time rule on the next pass.
        if end.time() == NaiveTime::MIN && begin.map_or(true, |b| b < end) {
            end -= TimeDelta::seconds(1);
        }

        let mut out = String::with_capacity(text.len() + 24);
        out.push_str(&text[..whole.end()]);
        out.push_str("<DTEND>");
        out.push_str(&format_timestamp(end));
        out.push_str(&text[whole.end()..]);

        Rewrite::Changed {
            text: out,
            note: "Fixing missing <DTEND> field".into(),
        }
    }
}

fn parse_start(value: &str) -> Option<NaiveDateTime> {
    if let Some(ts) = Timestamp::parse(value) {
        return Some(ts.datetime);
    }
    let date = NaiveDate::parse_from_str(value.get(..8)?, DATE_FORMAT).ok()?;
    Some(date.and_time(NaiveTime::MIN))
}

// ---------------------------------------------------------------------------

/// Enforces sign conventions inside investment buy/sell blocks:
/// buys have positive units and a negative total, sells the opposite.
///
/// Only the offending field is flipped, by toggling its sign character so the
/// server's number formatting is kept. Non-numeric values count as zero and
/// are never rewritten.
pub struct InvestmentSign {
    block_start: Regex,
    block_end: Regex,
    units: Regex,
    total: Regex,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Buy,
    Sell,
}

impl InvestmentSign {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            block_start: Regex::new(r"(?i)<(INVBUY|INVSELL)>")?,
            block_end: Regex::new(r"(?i)</?(?:INVBUY|INVSELL)>")?,
            units: Regex::new(r"(?i)<UNITS>")?,
            total: Regex::new(r"(?i)<TOTAL>")?,
        })
    }

    /// Byte range of the trimmed value following `tag` within `text[from..to]`.
    fn value_span(&self, tag: &Regex, text: &str, from: usize, to: usize) -> Option<Range<usize>> {
        let m = tag.find(&text[from..to])?;
        let value_start = from + m.end();
        let raw_end = text[value_start..to]
            .find('<')
            .map(|i| value_start + i)
            .unwrap_or(to);
        let raw = &text[value_start..raw_end];
        let lead = raw.len() - raw.trim_start().len();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let start = value_start + lead;
        Some(start..start + trimmed.len())
    }
}

impl ScrubRule for InvestmentSign {
    fn name(&self) -> RuleName {
        RuleName::InvestmentSign
    }

    fn applies(&self, _ctx: &ScrubContext<'_>, text: &str) -> bool {
        text.to_ascii_uppercase().contains("<INVSTMTTRNRS>")
    }

    fn apply(&self, _ctx: &ScrubContext<'_>, text: &str) -> Rewrite {
        let mut edits: Vec<(Range<usize>, String)> = Vec::new();

        for caps in self.block_start.captures_iter(text) {
            let (Some(open), Some(kind)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let side = if kind.as_str().eq_ignore_ascii_case("INVBUY") {
                Side::Buy
            } else {
                Side::Sell
            };
            let from = open.end();
            let to = self
                .block_end
                .find_at(text, from)
                .map(|m| m.start())
                .unwrap_or(text.len());

            if let Some(span) = self.value_span(&self.units, text, from, to) {
                let units = numeric(&text[span.clone()]);
                let wrong = match side {
                    Side::Buy => units < 0.0,
                    Side::Sell => units > 0.0,
                };
                if wrong {
                    edits.push((span.clone(), flip_sign(&text[span])));
                }
            }
            if let Some(span) = self.value_span(&self.total, text, from, to) {
                let total = numeric(&text[span.clone()]);
                let wrong = match side {
                    Side::Buy => total > 0.0,
                    Side::Sell => total < 0.0,
                };
                if wrong {
                    edits.push((span.clone(), flip_sign(&text[span])));
                }
            }
        }

        if edits.is_empty() {
            return Rewrite::Unchanged;
        }

        edits.sort_by_key(|(span, _)| std::cmp::Reverse(span.start));
        let mut out = text.to_string();
        for (span, value) in edits {
            out.replace_range(span, &value);
        }
        Rewrite::Changed {
            text: out,
            note: "Invalid investment sign (pos/neg) found. Corrected.".into(),
        }
    }
}

fn numeric(value: &str) -> f64 {
    value.trim().parse::<f64>().unwrap_or(0.0)
}

fn flip_sign(value: &str) -> String {
    if let Some(rest) = value.strip_prefix('-') {
        rest.to_string()
    } else if let Some(rest) = value.strip_prefix('+') {
        format!("-{}", rest)
    } else {
        format!("-{}", value)
    }
}

// ---------------------------------------------------------------------------

/// Removes tag/value pairs the importer rejects.
pub struct UnsupportedTags {
    patterns: Vec<(&'static str, Regex)>,
}

impl UnsupportedTags {
    pub fn new() -> Result<Self, regex::Error> {
        let patterns = UNSUPPORTED_TAGS
            .iter()
            .map(|tag| Ok((*tag, Regex::new(&format!(r"(?i)<{}>[^<]+", tag))?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { patterns })
    }
}

impl ScrubRule for UnsupportedTags {
    fn name(&self) -> RuleName {
        RuleName::UnsupportedTags
    }

    fn apply(&self, _ctx: &ScrubContext<'_>, text: &str) -> Rewrite {
        let mut out = text.to_string();
        let mut removed = Vec::new();
        for (tag, re) in &self.patterns {
            if re.is_match(&out) {
                out = re.replace_all(&out, "").into_owned();
                removed.push(format!("<{}>", tag));
            }
        }
        if removed.is_empty() {
            Rewrite::Unchanged
        } else {
            Rewrite::Changed {
                text: out,
                note: format!("{} tags removed. Not supported by the importer.", removed.join(", ")),
            }
        }
    }
}
