//! Posting field normalization: list/metadata coercions, salary formatting,
//! company extraction fallbacks, and fuzzy company-name matching.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// `[{"id": 1, "name": "Engineering"}]` -> `["Engineering"]`.
/// Plain strings pass through.
pub fn names_from_list(value: &Value) -> Vec<String> {
    let items = match value.as_array() {
        Some(items) => items,
        None => return Vec::new(),
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map.get("name").map(json_to_display),
            _ => None,
        })
        .collect()
}

/// Greenhouse-style `[{"name": "Location Type", "value": "Remote"}]` -> map.
pub fn metadata_to_map(value: &Value) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    if let Some(items) = value.as_array() {
        for item in items {
            let Some(map) = item.as_object() else { continue };
            let Some(name) = map.get("name").map(json_to_display) else {
                continue;
            };
            let Some(val) = map.get("value") else { continue };
            if name.is_empty() || val.is_null() {
                continue;
            }
            result.insert(name, json_to_display(val));
        }
    }
    result
}

/// Tags arrive as strings or as objects keyed by `name`/`tag`/`label`/`value`.
pub fn normalize_tags(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|tag| match tag {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => ["name", "tag", "label", "value"]
                    .iter()
                    .find_map(|key| map.get(*key))
                    .map(json_to_display),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn json_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_thousands(n: i64) -> String {
    let raw = n.abs().to_string();
    let mut out = String::with_capacity(raw.len() + raw.len() / 3);
    for (i, c) in raw.chars().enumerate() {
        if i > 0 && (raw.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if n < 0 {
        format!("-{out}")
    } else {
        out
    }
}

/// `"$100,000 - $150,000"` from structured min/max salary values,
/// `"$100,000+"` when only a minimum is configured.
pub fn format_salary(min_val: &Value, max_val: Option<&Value>) -> String {
    let to_num = |v: &Value| -> Option<i64> {
        v.as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
            .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()).map(|f| f as i64))
    };

    let Some(min) = to_num(min_val) else {
        return String::new();
    };
    match max_val.and_then(to_num) {
        Some(max) => format!("${} - ${}", format_thousands(min), format_thousands(max)),
        None => format!("${}+", format_thousands(min)),
    }
}

/// Split `"Vendor: Role"` aggregator titles into (company, title).
/// Over-long company segments are treated as not-a-company.
pub fn company_from_title(title: &str) -> Option<(String, String)> {
    let (company, job_title) = title.split_once(':')?;
    let company = company.trim();
    let job_title = job_title.trim();
    if company.is_empty() || job_title.is_empty() || company.len() > 100 {
        return None;
    }
    Some((company.to_string(), job_title.to_string()))
}

fn website_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r#"URL:</strong>\s*<a\s+href="(https?://[^"]+)""#,
            r#"URL:&lt;/strong&gt;\s*&lt;a\s+href=&quot;(https?://[^&]+)&quot;"#,
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
    })
}

/// Extract a company website from aggregator description markup
/// (`<strong>URL:</strong> <a href="https://company.com">`).
pub fn company_website_from_description(description: &str) -> Option<String> {
    for re in website_res() {
        if let Some(caps) = re.captures(description) {
            let url = caps.get(1)?.as_str();
            if let Ok(parsed) = url::Url::parse(url) {
                if matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some() {
                    return Some(url.to_string());
                }
            }
        }
    }
    None
}

fn headquarters_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"(?i)Headquarters:</strong>\s*([^\n<]+)",
            r"(?i)Headquarters:&lt;/strong&gt;\s*([^\n&]+)",
            r"(?i)Headquarters:\s*([^\n<]+)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
    })
}

/// Extract a location from a `Headquarters: City, Country` stanza.
pub fn location_from_description(description: &str) -> Option<String> {
    for re in headquarters_res() {
        if let Some(caps) = re.captures(description) {
            let location = caps.get(1)?.as_str().trim();
            if !location.is_empty() && location.len() < 100 {
                return Some(location.to_string());
            }
        }
    }
    None
}

const LEGAL_SUFFIXES: [&str; 16] = [
    " inc.", " inc", " llc", " ltd.", " ltd", " co.", " co", " corp.", " corp", " gmbh", " ag",
    " pty ltd", " pty", " holdings", " group", " limited",
];

fn domain_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.(io|com|ai|app|dev|co|net|org)$").expect("valid regex"))
}

/// Normalize a company name for fuzzy matching: lowercase, strip trailing
/// legal and domain suffixes, drop punctuation, collapse whitespace.
pub fn normalize_company_name(name: &str) -> String {
    let mut result = name.to_lowercase().trim().to_string();

    for suffix in LEGAL_SUFFIXES {
        if let Some(stripped) = result.strip_suffix(suffix) {
            result = stripped.to_string();
            break;
        }
    }

    result = domain_suffix_re().replace(&result, "").to_string();
    result = result
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fuzzy company-filter match: exact after normalization, or word-boundary
/// containment in either direction when the shorter side is long enough to
/// be meaningful ("AI" must not match "RAIL").
pub fn matches_company_filter(company: &str, filter: &str) -> bool {
    if company.is_empty() {
        return false;
    }

    let filter_norm = normalize_company_name(filter);
    let company_norm = normalize_company_name(company);

    if filter_norm == company_norm {
        return true;
    }

    const MIN_LEN: usize = 3;
    let word_contains = |needle: &str, haystack: &str| -> bool {
        Regex::new(&format!(r"\b{}\b", regex::escape(needle)))
            .map(|re| re.is_match(haystack))
            .unwrap_or(false)
    };

    if filter_norm.len() >= MIN_LEN && word_contains(&filter_norm, &company_norm) {
        return true;
    }
    if company_norm.len() >= MIN_LEN && word_contains(&company_norm, &filter_norm) {
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_from_greenhouse_objects() {
        let value = json!([{"id": 1, "name": "Engineering"}, {"id": 2, "name": "Product"}]);
        assert_eq!(names_from_list(&value), vec!["Engineering", "Product"]);
        assert_eq!(names_from_list(&json!(["A", "B"])), vec!["A", "B"]);
        assert_eq!(names_from_list(&json!("scalar")), Vec::<String>::new());
    }

    #[test]
    fn metadata_pairs_become_map() {
        let value = json!([
            {"name": "Location Type", "value": "Remote"},
            {"name": "Empty", "value": null},
        ]);
        let map = metadata_to_map(&value);
        assert_eq!(map.get("Location Type").map(String::as_str), Some("Remote"));
        assert!(!map.contains_key("Empty"));
    }

    #[test]
    fn tags_normalize_strings_and_objects() {
        let value = json!(["rust", {"name": "backend"}, {"label": "senior"}]);
        assert_eq!(normalize_tags(&value), vec!["rust", "backend", "senior"]);
        assert_eq!(normalize_tags(&json!("solo")), vec!["solo"]);
    }

    #[test]
    fn salary_formatting() {
        assert_eq!(
            format_salary(&json!(100000), Some(&json!(150000))),
            "$100,000 - $150,000"
        );
        assert_eq!(format_salary(&json!(95000), None), "$95,000+");
        assert_eq!(format_salary(&json!("120000"), None), "$120,000+");
        assert_eq!(format_salary(&json!("n/a"), None), "");
    }

    #[test]
    fn vendor_prefix_split() {
        assert_eq!(
            company_from_title("Toptal: Android Developer"),
            Some(("Toptal".to_string(), "Android Developer".to_string()))
        );
        assert_eq!(company_from_title("No separator here"), None);
        assert_eq!(company_from_title(": Missing company"), None);
    }

    #[test]
    fn website_from_aggregator_markup() {
        let desc = r#"<strong>URL:</strong> <a href="https://acme.dev">https://acme.dev</a>"#;
        assert_eq!(
            company_website_from_description(desc),
            Some("https://acme.dev".to_string())
        );
        assert_eq!(company_website_from_description("no url markup"), None);
    }

    #[test]
    fn headquarters_location() {
        let desc = "<strong>Headquarters:</strong> Lisbon, Portugal<br/>";
        assert_eq!(
            location_from_description(desc),
            Some("Lisbon, Portugal".to_string())
        );
    }

    #[test]
    fn normalization_strips_suffixes() {
        assert_eq!(normalize_company_name("Acme Inc."), "acme");
        assert_eq!(normalize_company_name("ACME"), "acme");
        assert_eq!(normalize_company_name("Widget.io"), "widget");
        assert_eq!(normalize_company_name("Tools GmbH"), "tools");
    }

    #[test]
    fn fuzzy_filter_rules() {
        assert!(matches_company_filter("Proxify AB", "Proxify"));
        assert!(matches_company_filter("Acme", "Acme Inc."));
        assert!(!matches_company_filter("RAIL Company", "AI"));
        assert!(!matches_company_filter("WaterLemon Co", "Lemon"));
        assert!(!matches_company_filter("", "Acme"));
    }
}
