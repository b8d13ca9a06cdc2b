//! Common utilities and helper functions

pub mod error;
pub mod retry;

use chrono::{DateTime, Duration, DurationRound, NaiveTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Normalize whitespace in scraped text
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// First run of ASCII digits in `text`, e.g. `"1 234 pts"` gives `1`
pub fn parse_first_integer(text: &str) -> Option<i64> {
    static DIGITS_RE: OnceLock<Regex> = OnceLock::new();

    let re = DIGITS_RE.get_or_init(|| Regex::new(r"[0-9]+").expect("Invalid regex pattern"));

    re.find(text).and_then(|m| m.as_str().parse().ok())
}

/// First decimal number in `text`, accepting `,` as decimal separator
pub fn parse_first_decimal(text: &str) -> Option<f64> {
    static DECIMAL_RE: OnceLock<Regex> = OnceLock::new();

    let re = DECIMAL_RE
        .get_or_init(|| Regex::new(r"[0-9]+(?:[.,][0-9]+)?").expect("Invalid regex pattern"));

    re.find(text)
        .and_then(|m| m.as_str().replace(',', ".").parse().ok())
}

/// `at` with minutes, seconds and sub-seconds cleared
pub fn truncate_to_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(Duration::hours(1)).unwrap_or(at)
}

/// Midnight (UTC) of the calendar day containing `at`
pub fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}
