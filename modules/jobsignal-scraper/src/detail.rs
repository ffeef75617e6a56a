//! Detail-page enrichment.
//!
//! A posting is enriched when the source is marked `follow_detail`, or when
//! the list page left it without a description or posted date. Fetch
//! failures never fail the scrape; the caller decides what a blocked detail
//! page means for the source.

use std::time::Duration;

use jobsignal_common::{Posting, ScrapingSettings, SourceConfig};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

use crate::dates::parse_job_date;
use crate::sanitize::sanitize_html_description;

/// Outcome of a detail-enrichment attempt.
pub enum DetailFetch {
    Enriched,
    Miss(String),
    Blocked(String),
}

pub fn should_enrich(config: &SourceConfig, posting: &Posting) -> bool {
    config.follow_detail
        || posting.description.trim().is_empty()
        || posting.posted_date.is_none()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Platform {
    SmartRecruiters,
    Workday,
    Generic,
}

fn detect_platform(config: &SourceConfig) -> Platform {
    let url = config.url.to_lowercase();
    if url.contains("smartrecruiters.com") {
        Platform::SmartRecruiters
    } else if url.contains("myworkdayjobs.com") {
        Platform::Workday
    } else {
        Platform::Generic
    }
}

/// Enrich a posting from its detail page or detail API.
/// The configured fetch delay is applied after the request, even on failure.
pub async fn enrich(
    http: &reqwest::Client,
    config: &SourceConfig,
    settings: &ScrapingSettings,
    posting: &mut Posting,
) -> DetailFetch {
    let outcome = match detect_platform(config) {
        Platform::SmartRecruiters => enrich_smartrecruiters(http, settings, posting).await,
        Platform::Workday => enrich_workday(http, config, settings, posting).await,
        Platform::Generic => enrich_generic(http, settings, posting).await,
    };

    apply_delay(settings).await;
    outcome
}

async fn apply_delay(settings: &ScrapingSettings) {
    if settings.fetch_delay_seconds > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(settings.fetch_delay_seconds)).await;
    }
}

async fn fetch_text(
    http: &reqwest::Client,
    settings: &ScrapingSettings,
    url: &str,
) -> std::result::Result<String, DetailFetch> {
    let response = http
        .get(url)
        .timeout(Duration::from_secs(settings.detail_timeout_secs))
        .send()
        .await
        .map_err(|e| DetailFetch::Miss(format!("detail request failed: {e}")))?;

    let status = response.status();
    if status.is_client_error() {
        return Err(DetailFetch::Blocked(format!(
            "HTTP {} from detail page",
            status.as_u16()
        )));
    }
    if !status.is_success() {
        return Err(DetailFetch::Miss(format!("HTTP {}", status.as_u16())));
    }

    response
        .text()
        .await
        .map_err(|e| DetailFetch::Miss(format!("detail body read failed: {e}")))
}

// --- SmartRecruiters ---

async fn enrich_smartrecruiters(
    http: &reqwest::Client,
    settings: &ScrapingSettings,
    posting: &mut Posting,
) -> DetailFetch {
    let body = match fetch_text(http, settings, &posting.url.clone()).await {
        Ok(body) => body,
        Err(outcome) => return outcome,
    };
    let data: Value = match serde_json::from_str(&body) {
        Ok(data) => data,
        Err(e) => return DetailFetch::Miss(format!("detail JSON parse failed: {e}")),
    };

    let sections = &data["jobAd"]["sections"];
    let description = non_empty_str(&sections["jobDescription"]["text"])
        .or_else(|| non_empty_str(&sections["qualifications"]["text"]));
    if let Some(desc) = description {
        posting.description = sanitize_html_description(&desc);
    }

    if posting.title.is_empty() {
        if let Some(title) = non_empty_str(&data["name"]) {
            posting.title = title;
        }
    }
    if posting.location.is_empty() {
        if let Some(location) = non_empty_str(&data["location"]["fullLocation"]) {
            posting.location = location;
        }
    }
    if posting.posted_date.is_none() {
        posting.posted_date =
            non_empty_str(&data["releasedDate"]).or_else(|| non_empty_str(&data["posted"]));
    }

    DetailFetch::Enriched
}

// --- Workday ---

async fn enrich_workday(
    http: &reqwest::Client,
    config: &SourceConfig,
    settings: &ScrapingSettings,
    posting: &mut Posting,
) -> DetailFetch {
    // The list API returns an externalPath; resolve it against base_url.
    let base = config.base_url.as_deref().unwrap_or(&config.url);
    let detail_url = if posting.url.starts_with("http") {
        posting.url.clone()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            posting.url.trim_start_matches('/')
        )
    };

    let body = match fetch_text(http, settings, &detail_url).await {
        Ok(body) => body,
        Err(outcome) => return outcome,
    };
    let data: Value = match serde_json::from_str(&body) {
        Ok(data) => data,
        Err(e) => return DetailFetch::Miss(format!("detail JSON parse failed: {e}")),
    };

    let info = &data["jobPostingInfo"];
    let description =
        non_empty_str(&info["jobDescription"]).or_else(|| non_empty_str(&info["qualifications"]));
    if let Some(desc) = description {
        posting.description = sanitize_html_description(&desc);
    }

    if posting.title.is_empty() {
        if let Some(title) = non_empty_str(&info["title"]) {
            posting.title = title;
        }
    }
    if posting.location.is_empty() {
        if let Some(location) =
            non_empty_str(&info["location"]).or_else(|| non_empty_str(&info["locationNames"]))
        {
            posting.location = location;
        }
    }
    if posting.posted_date.is_none() {
        posting.posted_date =
            non_empty_str(&info["startDate"]).or_else(|| non_empty_str(&info["postedOn"]));
    }

    // The externalPath is useless downstream; store the resolved URL.
    posting.url = detail_url;

    DetailFetch::Enriched
}

// --- Generic HTML detail pages ---

async fn enrich_generic(
    http: &reqwest::Client,
    settings: &ScrapingSettings,
    posting: &mut Posting,
) -> DetailFetch {
    let body = match fetch_text(http, settings, &posting.url.clone()).await {
        Ok(body) => body,
        Err(outcome) => return outcome,
    };

    extract_from_html(&body, posting);
    DetailFetch::Enriched
}

/// Apply the HTML extraction strategies to a detail document. Only fills
/// fields that are currently missing.
pub fn extract_from_html(html: &str, posting: &mut Posting) {
    let document = Html::parse_document(html);

    extract_from_jsonld(&document, posting);

    if posting.posted_date.is_none() {
        posting.posted_date = extract_posted_date(&document);
    }
}

fn extract_from_jsonld(document: &Html, posting: &mut Posting) {
    let selector = Selector::parse("script[type=\"application/ld+json\"]").expect("valid selector");

    for script in document.select(&selector) {
        let text = script.text().collect::<String>();
        let Ok(data) = serde_json::from_str::<Value>(&text) else {
            continue;
        };

        let job_posting = find_job_posting(&data);
        let Some(jp) = job_posting else { continue };

        if posting.title.is_empty() {
            if let Some(title) = non_empty_str(&jp["title"]) {
                posting.title = title;
            }
        }
        if posting.company.is_empty() {
            if let Some(name) = non_empty_str(&jp["hiringOrganization"]["name"]) {
                posting.company = name;
            }
        }
        if posting.description.is_empty() {
            if let Some(desc) = non_empty_str(&jp["description"]) {
                posting.description = sanitize_html_description(&desc);
            }
        }
        if posting.location.is_empty() {
            if let Some(location) = jsonld_location(jp) {
                posting.location = location;
            }
        }
        if posting.posted_date.is_none() {
            posting.posted_date = non_empty_str(&jp["datePosted"]);
        }
        return;
    }
}

/// Find a JobPosting node: directly, in a top-level array, or inside an
/// `@graph` wrapper.
fn find_job_posting(data: &Value) -> Option<&Value> {
    let is_job_posting =
        |v: &Value| v.get("@type").and_then(Value::as_str) == Some("JobPosting");

    match data {
        Value::Array(items) => items.iter().find(|v| is_job_posting(v)),
        Value::Object(_) => {
            if is_job_posting(data) {
                return Some(data);
            }
            data.get("@graph")
                .and_then(Value::as_array)
                .and_then(|graph| graph.iter().find(|v| is_job_posting(v)))
        }
        _ => None,
    }
}

fn jsonld_location(jp: &Value) -> Option<String> {
    let place = match &jp["jobLocation"] {
        Value::Array(items) => items.first()?,
        other => other,
    };
    let addr = &place["address"];
    let parts: Vec<String> = ["addressLocality", "addressRegion", "addressCountry"]
        .iter()
        .filter_map(|key| non_empty_str(&addr[*key]))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

const META_DATE_ATTRS: [(&str, &str); 11] = [
    ("property", "article:published_time"),
    ("property", "og:article:published_time"),
    ("name", "date"),
    ("name", "publish_date"),
    ("name", "publication_date"),
    ("name", "DC.date"),
    ("name", "DC.date.issued"),
    ("name", "dcterms.created"),
    ("property", "datePublished"),
    ("itemprop", "datePosted"),
    ("itemprop", "datePublished"),
];

const DATE_SELECTORS: [&str; 15] = [
    "[class*='posted-date']",
    "[class*='post-date']",
    "[class*='publish-date']",
    "[class*='date-posted']",
    "[class*='job-date']",
    "[class*='listing-date']",
    "[class*='created-date']",
    "[class*='datePosted']",
    "[class*='postDate']",
    "[class*='jobDate']",
    "[data-automation*='date']",
    "[data-testid*='date']",
    ".posted-on",
    ".job-posted",
    ".posting-date",
];

const ANCESTOR_CLASS_HINTS: [&str; 6] = ["post", "publish", "date", "created", "listed", "added"];

fn extract_posted_date(document: &Html) -> Option<String> {
    extract_date_from_meta(document)
        .or_else(|| extract_date_from_time_elements(document))
        .or_else(|| extract_date_from_selectors(document))
        .or_else(|| extract_date_from_text_patterns(document))
}

fn extract_date_from_meta(document: &Html) -> Option<String> {
    for (attr, name) in META_DATE_ATTRS {
        let selector = Selector::parse(&format!("meta[{attr}=\"{name}\"]")).ok()?;
        for meta in document.select(&selector) {
            if let Some(content) = meta.value().attr("content") {
                let content = content.trim();
                if !content.is_empty() && parse_job_date(content).is_some() {
                    return Some(content.to_string());
                }
            }
        }
    }
    None
}

/// `<time datetime>` elements, preferring ones inside ancestors whose class
/// hints at posting metadata; otherwise the first valid date wins.
fn extract_date_from_time_elements(document: &Html) -> Option<String> {
    let selector = Selector::parse("time[datetime]").expect("valid selector");
    let mut first_valid: Option<String> = None;

    for time_el in document.select(&selector) {
        let Some(datetime) = time_el.value().attr("datetime") else {
            continue;
        };
        if parse_job_date(datetime).is_none() {
            continue;
        }
        if first_valid.is_none() {
            first_valid = Some(datetime.to_string());
        }

        let mut depth = 0;
        for ancestor in time_el.ancestors().filter_map(ElementRef::wrap) {
            depth += 1;
            if depth > 5 {
                break;
            }
            let classes = ancestor
                .value()
                .classes()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
            if ANCESTOR_CLASS_HINTS.iter().any(|hint| classes.contains(hint)) {
                return Some(datetime.to_string());
            }
        }
    }

    first_valid
}

fn extract_date_from_selectors(document: &Html) -> Option<String> {
    for raw in DATE_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        for el in document.select(&selector) {
            if let Some(datetime) = el.value().attr("datetime") {
                if parse_job_date(datetime).is_some() {
                    return Some(datetime.to_string());
                }
            }
            let text = el.text().collect::<String>();
            let text = text.trim();
            if !text.is_empty() && parse_job_date(text).is_some() {
                return Some(text.to_string());
            }
        }
    }
    None
}

fn date_pattern_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"(?i)posted\s*:?\s*(.+?)(?:\s*[|\-•]|$)",
            r"(?i)published\s*:?\s*(.+?)(?:\s*[|\-•]|$)",
            r"(?i)listed\s*:?\s*(.+?)(?:\s*[|\-•]|$)",
            r"(?i)added\s*:?\s*(.+?)(?:\s*[|\-•]|$)",
            r"(?i)(\d+\s*(?:day|days|week|weeks|hour|hours|month|months)\s*ago)",
            r"(?i)(today|yesterday|just\s*now|just\s*posted)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
    })
}

const METADATA_SELECTORS: [&str; 8] = [
    "[class*='meta']",
    "[class*='info']",
    "[class*='detail']",
    "[class*='header']",
    "[class*='summary']",
    "header",
    ".job-info",
    ".posting-info",
];

/// "Posted 2 days ago"-style phrases inside metadata-looking blocks.
fn extract_date_from_text_patterns(document: &Html) -> Option<String> {
    let mut candidates = Vec::new();
    for raw in METADATA_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        for el in document.select(&selector) {
            let text = el.text().collect::<Vec<_>>().join(" ");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !text.is_empty() && text.len() < 500 {
                candidates.push(text);
            }
        }
    }

    for text in &candidates {
        for re in date_pattern_res() {
            if let Some(caps) = re.captures(text) {
                let date_str = caps.get(1)?.as_str().trim();
                if parse_job_date(date_str).is_some() {
                    debug!(date_str, "Posted date recovered from text pattern");
                    return Some(date_str.to_string());
                }
            }
        }
    }
    None
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_posting(url: &str) -> Posting {
        Posting::new("", url)
    }

    #[test]
    fn should_enrich_rules() {
        let config = SourceConfig::new(jobsignal_common::SourceType::Api, "https://x.test");
        let mut posting = Posting::new("Engineer", "https://x.test/1");
        assert!(should_enrich(&config, &posting), "no description");

        posting.description = "Full description".to_string();
        assert!(should_enrich(&config, &posting), "no posted_date");

        posting.posted_date = Some("2025-07-01".to_string());
        assert!(!should_enrich(&config, &posting));

        let mut follow = config.clone();
        follow.follow_detail = true;
        assert!(should_enrich(&follow, &posting), "follow_detail forces it");
    }

    #[test]
    fn jsonld_direct_job_posting() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@type": "JobPosting", "title": "Platform Engineer",
             "hiringOrganization": {"name": "Acme"},
             "description": "<p>Build the platform.</p>",
             "datePosted": "2025-07-10",
             "jobLocation": {"address": {"addressLocality": "Austin", "addressRegion": "TX"}}}
        </script></head><body></body></html>"#;

        let mut posting = empty_posting("https://x.test/1");
        extract_from_html(html, &mut posting);
        assert_eq!(posting.title, "Platform Engineer");
        assert_eq!(posting.company, "Acme");
        assert_eq!(posting.description, "Build the platform.");
        assert_eq!(posting.location, "Austin, TX");
        assert_eq!(posting.posted_date.as_deref(), Some("2025-07-10"));
    }

    #[test]
    fn jsonld_graph_wrapper() {
        let html = r#"<script type="application/ld+json">
            {"@graph": [{"@type": "WebSite"}, {"@type": "JobPosting", "title": "SRE"}]}
        </script>"#;
        let mut posting = empty_posting("https://x.test/1");
        extract_from_html(html, &mut posting);
        assert_eq!(posting.title, "SRE");
    }

    #[test]
    fn jsonld_never_clobbers_existing_fields() {
        let html = r#"<script type="application/ld+json">
            {"@type": "JobPosting", "title": "Wrong Title", "datePosted": "2025-01-01"}
        </script>"#;
        let mut posting = Posting::new("List Title", "https://x.test/1");
        extract_from_html(html, &mut posting);
        assert_eq!(posting.title, "List Title");
        assert_eq!(posting.posted_date.as_deref(), Some("2025-01-01"));
    }

    #[test]
    fn meta_tag_date() {
        let html = r#"<head><meta property="article:published_time" content="2025-07-12T08:00:00Z"></head>"#;
        let mut posting = empty_posting("https://x.test/1");
        extract_from_html(html, &mut posting);
        assert_eq!(posting.posted_date.as_deref(), Some("2025-07-12T08:00:00Z"));
    }

    #[test]
    fn time_element_prefers_posting_context() {
        let html = r#"
            <div class="sidebar"><time datetime="2024-01-01">old</time></div>
            <div class="posted-info"><time datetime="2025-07-14">recent</time></div>
        "#;
        let document = Html::parse_document(html);
        assert_eq!(
            extract_date_from_time_elements(&document).as_deref(),
            Some("2025-07-14")
        );
    }

    #[test]
    fn css_selector_date() {
        let html = r#"<span class="posted-date">July 10, 2025</span>"#;
        let mut posting = empty_posting("https://x.test/1");
        extract_from_html(html, &mut posting);
        assert_eq!(posting.posted_date.as_deref(), Some("July 10, 2025"));
    }

    #[test]
    fn text_pattern_relative_date() {
        let html = r#"<div class="job-meta">Posted 2 days ago | Full-time</div>"#;
        let mut posting = empty_posting("https://x.test/1");
        extract_from_html(html, &mut posting);
        let date = posting.posted_date.expect("date extracted");
        assert!(date.to_lowercase().contains("2 days ago"), "got {date}");
    }
}
