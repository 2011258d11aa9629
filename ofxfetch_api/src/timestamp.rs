//! Protocol datetime values: `YYYYMMDDHHMMSS[.fff][offset:ABBR]`.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};

/// chrono format string for the 14-digit date+time portion.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// chrono format string for the 8-digit date portion.
pub const DATE_FORMAT: &str = "%Y%m%d";

/// Formats `dt` as exactly 14 digits.
pub fn format_timestamp(dt: NaiveDateTime) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Formats the current local time as exactly 14 digits.
pub fn now_timestamp() -> String {
    format_timestamp(Local::now().naive_local())
}

/// Noon on the given date. Used wherever only the calendar date must survive
/// the importer's time-zone interpretation.
pub fn noon(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN))
}

/// A datetime value split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    pub datetime: NaiveDateTime,
    /// Fractional seconds without the leading dot, e.g. `"000"`.
    pub fraction: Option<String>,
    /// The bracketed zone annotation including brackets, e.g. `"[-5:EST]"`.
    pub zone: Option<String>,
}

impl Timestamp {
    /// Parses a full 14-digit value with optional fraction and zone annotation.
    /// Returns `None` for date-only values or anything malformed.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (body, zone) = match raw.find('[') {
            Some(idx) => (&raw[..idx], Some(raw[idx..].to_string())),
            None => (raw, None),
        };
        let (digits, fraction) = match body.find('.') {
            Some(idx) => (&body[..idx], Some(body[idx + 1..].to_string())),
            None => (body, None),
        };
        if digits.len() != 14 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let datetime = NaiveDateTime::parse_from_str(digits, TIMESTAMP_FORMAT).ok()?;
        Some(Self {
            datetime,
            fraction,
            zone,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_fourteen_digits() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let s = format_timestamp(dt);
        assert_eq!(s, "20240105030405");
        assert_eq!(s.len(), 14);
    }

    #[test]
    fn now_is_fourteen_digits() {
        let s = now_timestamp();
        assert_eq!(s.len(), 14);
        assert!(s.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn parses_fraction_and_zone() {
        let ts = Timestamp::parse("20100730120000.000[-4:EDT]").unwrap();
        assert_eq!(format_timestamp(ts.datetime), "20100730120000");
        assert_eq!(ts.fraction.as_deref(), Some("000"));
        assert_eq!(ts.zone.as_deref(), Some("[-4:EDT]"));
    }

    #[test]
    fn rejects_date_only_and_garbage() {
        assert!(Timestamp::parse("20100730").is_none());
        assert!(Timestamp::parse("2010073012000x").is_none());
        assert!(Timestamp::parse("20101399120000").is_none());
    }
}
