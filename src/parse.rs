//! Forgiving parsers for the textual values found in CSV exports and API
//! payloads. None of these fail: malformed input resolves to a default.

use std::borrow::Cow;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::trace;

use crate::money::Money;

/// Formats tried in order by [`parse_date`]. The first one that matches wins.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",  // 2026-01-31
    "%b %d, %Y", // Jan 31, 2026
    "%B %d, %Y", // January 31, 2026
    "%m/%d/%Y",  // 01/31/2026
    "%m/%d/%y",  // 01/31/26
];

/// A field value that may arrive either as a number or as text, depending on
/// the data source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    pub fn as_currency(&self) -> Money {
        match self {
            RawValue::Number(n) => Money::from_dollars(*n),
            RawValue::Text(s) => parse_currency(s),
        }
    }

    pub fn as_percentage(&self) -> f64 {
        match self {
            RawValue::Number(n) if n.is_finite() => *n / 100.0,
            RawValue::Number(_) => 0.0,
            RawValue::Text(s) => parse_percentage(s),
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        match self {
            RawValue::Number(n) => Cow::Owned(n.to_string()),
            RawValue::Text(s) => Cow::Borrowed(s.as_str()),
        }
    }

    /// Whether the value carries no information (an empty or placeholder
    /// string).
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Number(_) => false,
            RawValue::Text(s) => is_placeholder(s),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_owned())
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

/// Parses a currency string such as `"$1,234.56"` or `"($50.00)"`.
/// Parentheses denote a negative amount. Returns zero if the string is empty
/// or cannot be parsed.
pub fn parse_currency(raw: &str) -> Money {
    let cleaned: String = raw.trim().chars().filter(|c| !matches!(c, '$' | ',')).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Money::ZERO;
    }
    let (negative, digits) = match cleaned.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner.trim()),
        None => (false, cleaned),
    };
    match digits.parse::<f64>() {
        Ok(value) if value.is_finite() => {
            let amount = Money::from_dollars(value);
            if negative {
                -amount
            } else {
                amount
            }
        }
        _ => {
            trace!("unparsable currency value {:?}", raw);
            Money::ZERO
        }
    }
}

/// Parses a percentage string such as `"12.5%"` into a fraction (`0.125`).
/// Returns 0 if the string is empty or cannot be parsed.
pub fn parse_percentage(raw: &str) -> f64 {
    let cleaned = raw.replace('%', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return 0.0;
    }
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => value / 100.0,
        _ => {
            trace!("unparsable percentage value {:?}", raw);
            0.0
        }
    }
}

/// Parses a date in any of the formats of [`DATE_FORMATS`], falling back to
/// RFC 3339 timestamps as returned by the API. Returns `None` for empty or
/// placeholder (`-`) input and for anything unrecognized.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if is_placeholder(s) {
        return None;
    }

    for format in DATE_FORMATS {
        if let Some(date) = parse_date_with(s, format) {
            return Some(date);
        }
    }

    // timestamps are taken at their own offset
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(s) {
        return Some(timestamp.date_naive());
    }
    if let Ok(timestamp) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(timestamp.date());
    }

    trace!("unparsable date value {:?}", raw);
    None
}

fn parse_date_with(s: &str, format: &str) -> Option<NaiveDate> {
    let date = NaiveDate::parse_from_str(s, format).ok()?;
    // chrono accepts short years for `%Y`; those belong to `%y`
    if format.ends_with("%Y") {
        let year = s.rsplit([' ', '/', ',']).next().unwrap_or_default();
        if year.len() < 4 {
            return None;
        }
    }
    Some(date)
}

/// Splits a comma-delimited list (such as `"1042, 1043"`) into its trimmed,
/// non-empty entries.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned).collect()
}

pub fn is_placeholder(s: &str) -> bool {
    let s = s.trim();
    s.is_empty() || s == "-"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_strings() {
        assert_eq!(parse_currency("$1,234.56"), Money::from_cents(123_456));
        assert_eq!(parse_currency("($50.00)"), Money::from_cents(-5_000));
        assert_eq!(parse_currency("-12.5"), Money::from_cents(-1_250));
        assert_eq!(parse_currency("  $ 7 "), Money::from_cents(700));
        assert_eq!(parse_currency(""), Money::ZERO);
        assert_eq!(parse_currency("n/a"), Money::ZERO);
        assert_eq!(parse_currency("()"), Money::ZERO);
    }

    #[test]
    fn percentage_strings() {
        assert_eq!(parse_percentage("12.5%"), 0.125);
        assert_eq!(parse_percentage("40"), 0.4);
        assert_eq!(parse_percentage(""), 0.0);
        assert_eq!(parse_percentage("%"), 0.0);
        assert_eq!(parse_percentage("lots"), 0.0);
    }

    #[test]
    fn all_date_formats_agree() {
        let expected = NaiveDate::from_ymd_opt(2026, 1, 31);
        for raw in ["2026-01-31", "Jan 31, 2026", "January 31, 2026", "01/31/2026", "01/31/26"] {
            assert_eq!(parse_date(raw), expected, "format of {raw:?}");
        }
    }

    #[test]
    fn placeholder_and_garbage_dates() {
        assert_eq!(parse_date("-"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("   "), None);
        assert_eq!(parse_date("someday"), None);
        assert_eq!(parse_date("02/30/2026"), None);
    }

    #[test]
    fn api_timestamps() {
        assert_eq!(parse_date("2026-01-05T14:00:00Z"), NaiveDate::from_ymd_opt(2026, 1, 5));
        assert_eq!(parse_date("2026-01-31T23:30:00-05:00"), NaiveDate::from_ymd_opt(2026, 1, 31));
        assert_eq!(parse_date("2026-01-05T08:15:00"), NaiveDate::from_ymd_opt(2026, 1, 5));
    }

    #[test]
    fn raw_values() {
        assert_eq!(RawValue::Number(1000.0).as_currency(), Money::from_cents(100_000));
        assert_eq!(RawValue::from("$2,000.00").as_currency(), Money::from_cents(200_000));
        assert_eq!(RawValue::from("35%").as_percentage(), 0.35);
        assert!(RawValue::from(" - ").is_blank());
        assert!(!RawValue::Number(0.0).is_blank());
    }

    #[test]
    fn lists() {
        assert_eq!(split_list("1042, 1043,,  "), vec!["1042".to_owned(), "1043".to_owned()]);
        assert!(split_list("").is_empty());
    }
}
