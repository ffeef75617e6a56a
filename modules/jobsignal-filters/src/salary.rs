//! Salary extraction from structured fields and free-text strings.

use jobsignal_common::Posting;
use regex::Regex;
use std::sync::OnceLock;

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\d,]+(?:k)?").expect("valid regex"))
}

/// Parse a free-text salary string and return the highest value found.
///
/// `$150k` -> 150000, `$100,000 - $150,000` -> 150000. A token mixing comma
/// grouping with a `k` suffix (`120,000k`) is ambiguous and skipped.
pub fn parse_salary_string(salary: &str) -> Option<i64> {
    let lower = salary.to_lowercase();
    let mut parsed = Vec::new();

    for m in number_re().find_iter(&lower) {
        let token = m.as_str();
        let has_k = token.ends_with('k');
        let has_comma = token.contains(',');

        if has_k && has_comma {
            continue;
        }
        let clean = token.trim_end_matches('k').replace(',', "");
        let Ok(num) = clean.parse::<i64>() else {
            continue;
        };
        parsed.push(if has_k { num * 1000 } else { num });
    }

    parsed.into_iter().max()
}

/// Salary for filtering purposes: structured max, then structured min,
/// then the best value recoverable from the salary string.
pub fn extract_salary(posting: &Posting) -> Option<i64> {
    if let Some(max) = posting.salary_max {
        return Some(max);
    }
    if let Some(min) = posting.salary_min {
        return Some(min);
    }
    posting
        .salary
        .as_deref()
        .and_then(parse_salary_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k_suffix_multiplies() {
        assert_eq!(parse_salary_string("$150k"), Some(150_000));
        assert_eq!(parse_salary_string("$100k - $150k"), Some(150_000));
    }

    #[test]
    fn comma_grouping_parses() {
        assert_eq!(parse_salary_string("$100,000 - $150,000"), Some(150_000));
        assert_eq!(parse_salary_string("100000"), Some(100_000));
    }

    #[test]
    fn mixed_comma_and_k_is_invalid() {
        assert_eq!(parse_salary_string("120,000k"), None);
    }

    #[test]
    fn prose_without_numbers_is_none() {
        assert_eq!(parse_salary_string("competitive salary"), None);
    }

    #[test]
    fn structured_fields_win() {
        let mut posting = Posting::new("E", "u");
        posting.salary = Some("$90k".to_string());
        posting.salary_max = Some(180_000);
        assert_eq!(extract_salary(&posting), Some(180_000));

        posting.salary_max = None;
        posting.salary_min = Some(120_000);
        assert_eq!(extract_salary(&posting), Some(120_000));

        posting.salary_min = None;
        assert_eq!(extract_salary(&posting), Some(90_000));
    }
}
