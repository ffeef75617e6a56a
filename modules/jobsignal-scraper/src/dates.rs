//! Posting-date parsing and normalization.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d+)\s*(hour|hours|day|days|week|weeks|month|months)\s*ago\b")
            .expect("valid regex")
    })
}

/// Best-effort parse of a posting date string.
///
/// Accepts RFC 3339 / RFC 2822, bare dates in common formats, pure-digit
/// unix timestamps (seconds or millis by digit count), and relative
/// phrases like "3 days ago" / "yesterday".
pub fn parse_job_date(input: &str) -> Option<DateTime<Utc>> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
        }
    }

    // Pure-digit unix timestamp: <=10 digits are seconds, >=11 millis.
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
        return timestamp_to_datetime(s.parse::<i64>().ok()?, s.len());
    }

    // Relative phrases.
    let lower = s.to_lowercase();
    if lower.contains("today") || lower.contains("just now") || lower.contains("just posted") {
        return Some(Utc::now());
    }
    if lower.contains("yesterday") {
        return Some(Utc::now() - Duration::days(1));
    }
    if let Some(caps) = relative_re().captures(&lower) {
        let n: i64 = caps.get(1)?.as_str().parse().ok()?;
        let unit = caps.get(2)?.as_str();
        let delta = match unit {
            "hour" | "hours" => Duration::hours(n),
            "day" | "days" => Duration::days(n),
            "week" | "weeks" => Duration::weeks(n),
            "month" | "months" => Duration::days(n * 30),
            _ => return None,
        };
        return Some(Utc::now() - delta);
    }

    None
}

fn timestamp_to_datetime(raw: i64, digit_count: usize) -> Option<DateTime<Utc>> {
    if digit_count >= 11 {
        DateTime::from_timestamp_millis(raw)
    } else {
        DateTime::from_timestamp(raw, 0)
    }
}

/// Normalize a raw posted-date value to an ISO 8601 string.
///
/// Numbers are unix timestamps (seconds vs millis by magnitude); strings are
/// parsed best-effort and re-emitted as ISO; anything unparseable is
/// returned verbatim so no information is lost.
pub fn normalize_date(value: &Value) -> String {
    match value {
        Value::Number(n) => {
            if let Some(raw) = n.as_i64() {
                let digits = raw.abs().to_string().len();
                return timestamp_to_datetime(raw, digits)
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_default();
            }
            if let Some(f) = n.as_f64() {
                return DateTime::from_timestamp(f as i64, 0)
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_default();
            }
            String::new()
        }
        Value::String(s) => match parse_job_date(s) {
            Some(dt) => dt.to_rfc3339(),
            None => s.clone(),
        },
        _ => String::new(),
    }
}

/// Age in whole days, when the date parses.
pub fn age_days(posted_date: &str, now: DateTime<Utc>) -> Option<i64> {
    parse_job_date(posted_date).map(|dt| (now - dt).num_days())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    #[test]
    fn parses_rfc3339() {
        let dt = parse_job_date("2025-07-17T10:00:00Z").unwrap();
        assert_eq!(dt.year(), 2025);
    }

    #[test]
    fn parses_bare_date() {
        let dt = parse_job_date("2025-07-17").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2025, 7, 17));
        let dt = parse_job_date("July 17, 2025").unwrap();
        assert_eq!((dt.year(), dt.month()), (2025, 7));
    }

    #[test]
    fn parses_relative_phrases() {
        let two_days = parse_job_date("posted 2 days ago").unwrap();
        let diff = Utc::now() - two_days;
        assert!((diff.num_hours() - 48).abs() <= 1);

        assert!(parse_job_date("yesterday").is_some());
        assert!(parse_job_date("just posted").is_some());
    }

    #[test]
    fn ten_digit_seconds_stay_in_range() {
        // 1752761621 = 2025-07-17 in seconds
        let iso = normalize_date(&json!(1752761621));
        assert!(iso.starts_with("2025-07-17"), "got {iso}");
    }

    #[test]
    fn thirteen_digit_millis_are_not_year_57k() {
        let iso = normalize_date(&json!(1752761621698_i64));
        assert!(iso.starts_with("2025-07-17"), "got {iso}");
    }

    #[test]
    fn unparseable_string_returned_verbatim() {
        assert_eq!(normalize_date(&json!("when the stars align")), "when the stars align");
    }

    #[test]
    fn string_timestamp_by_digit_count() {
        let secs = normalize_date(&json!("1752761621"));
        assert!(secs.starts_with("2025"), "got {secs}");
        let millis = normalize_date(&json!("1752761621698"));
        assert!(millis.starts_with("2025"), "got {millis}");
    }

    #[test]
    fn age_days_computes_from_iso() {
        let now = Utc::now();
        let three_days_ago = (now - Duration::days(3)).to_rfc3339();
        assert_eq!(age_days(&three_days_ago, now), Some(3));
        assert_eq!(age_days("gibberish", now), None);
    }
}
