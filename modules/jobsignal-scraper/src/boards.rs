//! Built-in single-posting scrapers for externally submitted job URLs.
//!
//! The JOB pipeline lands here when no registered source matches the URL:
//! known boards get a direct API or page scrape, everything else goes
//! through the generic detail-page extraction.

use std::time::Duration;

use jobsignal_common::{Posting, ScrapingSettings};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::info;

use crate::detail::extract_from_html;
use crate::error::{Result, ScrapeError};
use crate::sanitize::{sanitize_html_description, sanitize_title};

fn greenhouse_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"greenhouse\.io/(?:embed/job_app\?.*token=)?([A-Za-z0-9_-]+)/jobs/(\d+)")
            .expect("valid regex")
    })
}

/// Scrape a single job posting from an arbitrary URL.
pub async fn scrape_job_url(
    http: &reqwest::Client,
    settings: &ScrapingSettings,
    url: &str,
) -> Result<Posting> {
    let lower = url.to_lowercase();

    if lower.contains("greenhouse.io") {
        if let Some(caps) = greenhouse_re().captures(url) {
            let token = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let job_id = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            return scrape_greenhouse_job(http, settings, url, token, job_id).await;
        }
    }

    // WeWorkRemotely, Remotive, and everything else publish JSON-LD
    // JobPosting on the detail page; the generic path covers them.
    scrape_generic_job(http, settings, url).await
}

async fn scrape_greenhouse_job(
    http: &reqwest::Client,
    settings: &ScrapingSettings,
    original_url: &str,
    token: &str,
    job_id: &str,
) -> Result<Posting> {
    let api_url = format!("https://boards-api.greenhouse.io/v1/boards/{token}/jobs/{job_id}");
    info!(url = %api_url, "Scraping Greenhouse job via boards API");

    let response = http
        .get(&api_url)
        .timeout(Duration::from_secs(settings.detail_timeout_secs))
        .send()
        .await?;
    let status = response.status();
    if status.is_client_error() {
        return Err(ScrapeError::Blocked(format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("client error")
        )));
    }
    if !status.is_success() {
        return Err(ScrapeError::Request(format!("HTTP {}", status.as_u16())));
    }

    let data: Value = response
        .json()
        .await
        .map_err(|e| ScrapeError::Parse(format!("Greenhouse job response: {e}")))?;

    let title = data["title"].as_str().unwrap_or_default();
    if title.is_empty() {
        return Err(ScrapeError::Parse(
            "Greenhouse job response missing title".to_string(),
        ));
    }

    let mut posting = Posting::new(
        sanitize_title(title),
        data["absolute_url"].as_str().unwrap_or(original_url),
    );
    posting.company = data["company_name"]
        .as_str()
        .map(sanitize_title)
        .unwrap_or_else(|| humanize_board_token(token));
    posting.location = data["location"]["name"].as_str().unwrap_or_default().to_string();
    posting.description = data["content"]
        .as_str()
        .map(sanitize_html_description)
        .unwrap_or_default();
    posting.posted_date = data["updated_at"]
        .as_str()
        .or_else(|| data["first_published"].as_str())
        .map(str::to_string);

    Ok(posting)
}

/// "cloudflare" -> "Cloudflare", "acme-labs" -> "Acme Labs".
fn humanize_board_token(token: &str) -> String {
    token
        .split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

async fn scrape_generic_job(
    http: &reqwest::Client,
    settings: &ScrapingSettings,
    url: &str,
) -> Result<Posting> {
    info!(url, "Scraping job page generically");

    let response = http
        .get(url)
        .timeout(Duration::from_secs(settings.list_timeout_secs))
        .send()
        .await?;
    let status = response.status();
    if status.is_client_error() {
        return Err(ScrapeError::Blocked(format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("client error")
        )));
    }
    if !status.is_success() {
        return Err(ScrapeError::Request(format!("HTTP {}", status.as_u16())));
    }

    let body = response.text().await?;
    let mut posting = Posting::new("", url);
    extract_from_html(&body, &mut posting);

    if posting.title.is_empty() || posting.description.is_empty() {
        fill_from_page_chrome(&body, &mut posting);
    }

    if posting.title.is_empty() {
        return Err(ScrapeError::Parse(format!(
            "could not extract a job posting from {url}"
        )));
    }
    Ok(posting)
}

/// Last-resort extraction from `<title>` and `og:` meta tags.
fn fill_from_page_chrome(html: &str, posting: &mut Posting) {
    let document = Html::parse_document(html);

    if posting.title.is_empty() {
        let og_title = Selector::parse("meta[property=\"og:title\"]").expect("valid selector");
        let title_tag = Selector::parse("title").expect("valid selector");
        let raw = document
            .select(&og_title)
            .next()
            .and_then(|m| m.value().attr("content").map(str::to_string))
            .or_else(|| {
                document
                    .select(&title_tag)
                    .next()
                    .map(|t| t.text().collect::<String>())
            });
        if let Some(raw) = raw {
            posting.title = sanitize_title(&raw);
        }
    }

    if posting.description.is_empty() {
        let og_desc = Selector::parse("meta[property=\"og:description\"]").expect("valid selector");
        let meta_desc = Selector::parse("meta[name=\"description\"]").expect("valid selector");
        let raw = document
            .select(&og_desc)
            .next()
            .or_else(|| document.select(&meta_desc).next())
            .and_then(|m| m.value().attr("content").map(str::to_string));
        if let Some(raw) = raw {
            posting.description = sanitize_html_description(&raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greenhouse_url_pattern() {
        let caps = greenhouse_re()
            .captures("https://boards.greenhouse.io/cloudflare/jobs/7270583")
            .unwrap();
        assert_eq!(&caps[1], "cloudflare");
        assert_eq!(&caps[2], "7270583");

        let caps = greenhouse_re()
            .captures("https://job-boards.greenhouse.io/acme-labs/jobs/123")
            .unwrap();
        assert_eq!(&caps[1], "acme-labs");

        assert!(greenhouse_re()
            .captures("https://boards.greenhouse.io/cloudflare")
            .is_none());
    }

    #[test]
    fn board_tokens_humanize() {
        assert_eq!(humanize_board_token("cloudflare"), "Cloudflare");
        assert_eq!(humanize_board_token("acme-labs"), "Acme Labs");
        assert_eq!(humanize_board_token("big_corp"), "Big Corp");
    }

    #[test]
    fn page_chrome_fallback() {
        let html = r#"<html><head>
            <title>Senior Rust Engineer - Acme</title>
            <meta name="description" content="Work on systems software.">
        </head><body></body></html>"#;
        let mut posting = Posting::new("", "https://x.test/1");
        fill_from_page_chrome(html, &mut posting);
        assert_eq!(posting.title, "Senior Rust Engineer - Acme");
        assert_eq!(posting.description, "Work on systems software.");
    }
}
