//! ATS platform pattern registry.
//!
//! Known platforms are matched by URL pattern and turned into scraper
//! configs deterministically, without fetching or asking a model. The
//! registry also knows which aggregator URLs are single job listings and
//! which hosts are the ATS vendors' own sites.

use jobsignal_common::{extract_domain, SourceConfig};
use jobsignal_scraper::expand_config;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

pub struct PlatformPattern {
    pub name: &'static str,
    pub url_pattern: &'static str,
    /// "api" | "rss" | "html"
    pub config_type: &'static str,
    build: fn(&regex::Captures<'_>) -> Value,
}

impl PlatformPattern {
    fn regex(&self) -> Regex {
        Regex::new(self.url_pattern).expect("valid platform regex")
    }
}

pub fn platform_patterns() -> &'static [PlatformPattern] {
    static PATTERNS: OnceLock<Vec<PlatformPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            PlatformPattern {
                name: "greenhouse_api",
                url_pattern: r"(?:boards|job-boards)(?:-api)?\.greenhouse\.io/(?:v1/boards/)?([A-Za-z0-9_-]+)",
                config_type: "api",
                build: |caps| json!({ "board_token": &caps[1] }),
            },
            PlatformPattern {
                name: "lever",
                url_pattern: r"jobs\.lever\.co/([A-Za-z0-9_-]+)",
                config_type: "api",
                build: |caps| {
                    let slug = &caps[1];
                    json!({
                        "type": "api",
                        "url": format!("https://api.lever.co/v0/postings/{slug}?mode=json"),
                        "fields": {
                            "title": "text",
                            "url": "hostedUrl",
                            "location": "categories.location",
                            "description": "descriptionPlain",
                            "posted_date": "createdAt",
                            "tags": "tags",
                        },
                    })
                },
            },
            PlatformPattern {
                name: "ashby_api",
                url_pattern: r"jobs\.ashbyhq\.com/([A-Za-z0-9_-]+)",
                config_type: "api",
                build: |caps| {
                    let slug = &caps[1];
                    json!({
                        "type": "api",
                        "url": format!(
                            "https://api.ashbyhq.com/posting-api/job-board/{slug}?includeCompensation=true"
                        ),
                        "response_path": "jobs",
                        "fields": {
                            "title": "title",
                            "url": "jobUrl",
                            "location": "location",
                            "description": "descriptionHtml",
                            "posted_date": "publishedAt",
                            "is_remote": "isRemote",
                            "employment_type": "employmentType",
                        },
                    })
                },
            },
            PlatformPattern {
                name: "smartrecruiters_api",
                url_pattern: r"(?:careers|jobs)\.smartrecruiters\.com/([A-Za-z0-9_-]+)",
                config_type: "api",
                build: |caps| {
                    let slug = &caps[1];
                    json!({
                        "type": "api",
                        "url": format!("https://api.smartrecruiters.com/v1/companies/{slug}/postings"),
                        "response_path": "content",
                        "fields": {
                            "title": "name",
                            "url": "ref",
                            "location": "location.city",
                            "posted_date": "releasedDate",
                        },
                    })
                },
            },
            PlatformPattern {
                name: "workable_api",
                url_pattern: r"apply\.workable\.com/(?:api/v\d+/accounts/)?([A-Za-z0-9_-]+)",
                config_type: "api",
                build: |caps| {
                    let slug = &caps[1];
                    json!({
                        "type": "api",
                        "url": format!(
                            "https://apply.workable.com/api/v1/widget/accounts/{slug}?details=true"
                        ),
                        "response_path": "jobs",
                        "fields": {
                            "title": "title",
                            "url": "url",
                            "location": "city",
                            "description": "description",
                            "posted_date": "published_on",
                        },
                    })
                },
            },
            PlatformPattern {
                name: "breezy_api",
                url_pattern: r"([A-Za-z0-9_-]+)\.breezy\.hr",
                config_type: "api",
                build: |caps| {
                    let slug = &caps[1];
                    json!({
                        "type": "api",
                        "url": format!("https://{slug}.breezy.hr/json"),
                        "fields": {
                            "title": "name",
                            "url": "url",
                            "location": "location.name",
                            "posted_date": "published_date",
                        },
                    })
                },
            },
            PlatformPattern {
                name: "recruitee_api",
                url_pattern: r"([A-Za-z0-9_-]+)\.recruitee\.com",
                config_type: "api",
                build: |caps| {
                    let slug = &caps[1];
                    json!({
                        "type": "api",
                        "url": format!("https://{slug}.recruitee.com/api/offers/"),
                        "response_path": "offers",
                        "fields": {
                            "title": "title",
                            "url": "careers_url",
                            "location": "location",
                            "description": "description",
                            "posted_date": "created_at",
                        },
                    })
                },
            },
            PlatformPattern {
                name: "workday",
                url_pattern: r"([A-Za-z0-9_-]+)\.(wd\d+)\.myworkdayjobs\.com/(?:[a-z]{2}-[A-Z]{2}/)?([A-Za-z0-9_-]+)",
                config_type: "api",
                build: |caps| {
                    let tenant = &caps[1];
                    let cluster = &caps[2];
                    let board = &caps[3];
                    json!({
                        "type": "api",
                        "url": format!(
                            "https://{tenant}.{cluster}.myworkdayjobs.com/wday/cxs/{tenant}/{board}/jobs"
                        ),
                        "base_url": format!(
                            "https://{tenant}.{cluster}.myworkdayjobs.com/wday/cxs/{tenant}/{board}"
                        ),
                        "method": "POST",
                        "post_body": {"limit": 20, "offset": 0, "searchText": ""},
                        "response_path": "jobPostings",
                        "fields": {
                            "title": "title",
                            "url": "externalPath",
                            "location": "locationsText",
                            "posted_date": "postedOn",
                        },
                    })
                },
            },
        ]
    })
}

/// Match a URL against the platform registry.
pub fn match_platform(url: &str) -> Option<(&'static PlatformPattern, Value)> {
    for pattern in platform_patterns() {
        if let Some(caps) = pattern.regex().captures(url) {
            let tenant = caps.get(1).map(|m| m.as_str().to_lowercase());
            // Vendor marketing hosts sometimes match the tenant slot.
            if matches!(tenant.as_deref(), Some("www") | Some("about") | Some("help")) {
                continue;
            }
            return Some((pattern, (pattern.build)(&caps)));
        }
    }
    None
}

/// Build a full scraper config from a matched platform pattern. The board
/// token survives in the stored config so scrape-time expansion can rebuild
/// from it.
pub fn build_config_from_pattern(
    pattern: &PlatformPattern,
    raw: Value,
) -> Result<SourceConfig, jobsignal_scraper::ScrapeError> {
    let kind = match pattern.name {
        "greenhouse_api" => "greenhouse",
        _ => pattern.config_type,
    };
    let board_token = raw.get("board_token").cloned();
    let mut config = expand_config(kind, raw)?;
    if let Some(token) = board_token {
        config.extra.insert("board_token".to_string(), token);
    }
    Ok(config)
}

// --- Aggregator single-listing and ATS-vendor detection ---

fn single_job_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            // RemoteOK: /remote-jobs/remote-{title}-{company}-{id}
            r"remoteok\.(?:io|com)/remote-jobs/[^/]+-\d+$",
            // WeWorkRemotely: /remote-jobs/{category}/{slug}
            r"weworkremotely\.com/remote-jobs/[^/]+/\d+",
            // Jobicy: /job/{id}
            r"jobicy\.com/job/\d+",
            // Remotive: /remote-jobs/detail/{id}
            r"remotive\.(?:com|io)/remote-jobs/detail/\d+",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
    })
}

/// URLs pointing at individual aggregator job listings are invalid as
/// sources; they describe one job, not a board.
pub fn is_single_job_listing_url(url: &str) -> bool {
    single_job_res().iter().any(|re| re.is_match(url))
}

const ATS_PROVIDER_DOMAINS: [&str; 8] = [
    "greenhouse.com",
    "lever.co",
    "ashbyhq.com",
    "smartrecruiters.com",
    "workable.com",
    "breezy.hr",
    "recruitee.com",
    "applytojob.com",
];

/// True when the host is an ATS vendor's own site (greenhouse.com/careers)
/// rather than a customer board hosted on a vendor sub-domain.
pub fn is_ats_provider_url(url: &str) -> bool {
    let host = extract_domain(url);
    let host = host.trim_start_matches("www.");
    ATS_PROVIDER_DOMAINS.contains(&host)
}

/// Derive a Lever board slug from a single posting URL.
pub fn lever_slug_from_posting(url: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"jobs\.lever\.co/([A-Za-z0-9_-]+)/[A-Za-z0-9-]+").expect("valid regex")
    });
    re.captures(url).map(|caps| caps[1].to_lowercase())
}

/// Candidate Greenhouse slug for `jobs.<slug>.<tld>` / `careers.<slug>.<tld>`
/// hosts, to be verified with a live probe.
pub fn greenhouse_slug_from_host(url: &str) -> Option<String> {
    let host = extract_domain(url);
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() == 3 && matches!(parts[0], "jobs" | "careers") {
        let slug = parts[1].to_string();
        if !slug.is_empty() && slug != "www" {
            return Some(slug);
        }
    }
    None
}

/// Probe the popular ATS vendors for a company slug, most-popular first.
/// Returns the customer board URL on the first vendor that answers with
/// JSON.
pub async fn probe_company_ats(http: &reqwest::Client, slug: &str) -> Option<String> {
    let probes = [
        (
            format!("https://boards-api.greenhouse.io/v1/boards/{slug}/jobs"),
            format!("https://boards.greenhouse.io/{slug}"),
        ),
        (
            format!("https://api.lever.co/v0/postings/{slug}?mode=json"),
            format!("https://jobs.lever.co/{slug}"),
        ),
        (
            format!("https://api.ashbyhq.com/posting-api/job-board/{slug}"),
            format!("https://jobs.ashbyhq.com/{slug}"),
        ),
    ];

    for (probe_url, board_url) in probes {
        let response = http
            .get(&probe_url)
            .header("Accept", "application/json")
            .timeout(std::time::Duration::from_secs(8))
            .send()
            .await;
        if let Ok(resp) = response {
            if resp.status().is_success() && resp.json::<Value>().await.is_ok() {
                return Some(board_url);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsignal_common::SourceType;

    #[test]
    fn greenhouse_board_urls_match() {
        let (pattern, raw) =
            match_platform("https://boards.greenhouse.io/cloudflare").unwrap();
        assert_eq!(pattern.name, "greenhouse_api");
        let config = build_config_from_pattern(pattern, raw).unwrap();
        assert_eq!(config.source_type, SourceType::Api);
        assert!(config.url.contains("boards-api.greenhouse.io/v1/boards/cloudflare"));
        assert_eq!(
            config.extra.get("board_token"),
            Some(&serde_json::json!("cloudflare")),
            "token survives for scrape-time re-expansion"
        );
    }

    #[test]
    fn greenhouse_api_urls_match_too() {
        let (pattern, raw) =
            match_platform("https://boards-api.greenhouse.io/v1/boards/stripe/jobs").unwrap();
        assert_eq!(pattern.name, "greenhouse_api");
        let config = build_config_from_pattern(pattern, raw).unwrap();
        assert!(config.url.contains("stripe"));
    }

    #[test]
    fn lever_board_urls_match() {
        let (pattern, raw) = match_platform("https://jobs.lever.co/paymentology").unwrap();
        assert_eq!(pattern.name, "lever");
        let config = build_config_from_pattern(pattern, raw).unwrap();
        assert!(config.url.contains("api.lever.co/v0/postings/paymentology"));
        assert_eq!(config.fields.get("url").map(String::as_str), Some("hostedUrl"));
    }

    #[test]
    fn workday_urls_build_paginated_post_config() {
        let (pattern, raw) = match_platform(
            "https://nvidia.wd5.myworkdayjobs.com/NVIDIAExternalCareerSite",
        )
        .unwrap();
        assert_eq!(pattern.name, "workday");
        let config = build_config_from_pattern(pattern, raw).unwrap();
        assert_eq!(config.method.as_deref(), Some("POST"));
        assert!(config.url.contains("/wday/cxs/nvidia/NVIDIAExternalCareerSite/jobs"));
        let body = config.post_body.unwrap();
        assert_eq!(body["limit"], 20);
        assert_eq!(body["offset"], 0);
    }

    #[test]
    fn ashby_and_workable_match() {
        assert_eq!(
            match_platform("https://jobs.ashbyhq.com/acme").unwrap().0.name,
            "ashby_api"
        );
        assert_eq!(
            match_platform("https://apply.workable.com/acme").unwrap().0.name,
            "workable_api"
        );
    }

    #[test]
    fn unknown_urls_do_not_match() {
        assert!(match_platform("https://example.com/careers").is_none());
        assert!(match_platform("https://www.breezy.hr/pricing").is_none());
    }

    #[test]
    fn single_job_listing_detection() {
        assert!(is_single_job_listing_url(
            "https://remoteok.com/remote-jobs/remote-rust-engineer-acme-123456"
        ));
        assert!(is_single_job_listing_url(
            "https://weworkremotely.com/remote-jobs/programming/12345"
        ));
        assert!(is_single_job_listing_url("https://jobicy.com/job/98765"));
        assert!(is_single_job_listing_url(
            "https://remotive.com/remote-jobs/detail/456"
        ));
        assert!(!is_single_job_listing_url("https://remotive.com/api/remote-jobs"));
    }

    #[test]
    fn ats_provider_site_detection() {
        assert!(is_ats_provider_url("https://greenhouse.com/careers"));
        assert!(is_ats_provider_url("https://www.lever.co/jobs"));
        assert!(!is_ats_provider_url("https://boards.greenhouse.io/cloudflare"));
    }

    #[test]
    fn lever_posting_slug_derivation() {
        assert_eq!(
            lever_slug_from_posting("https://jobs.lever.co/Paymentology/abcd-1234"),
            Some("paymentology".to_string())
        );
        assert_eq!(lever_slug_from_posting("https://jobs.lever.co/acme"), None);
    }

    #[test]
    fn greenhouse_host_heuristic() {
        assert_eq!(
            greenhouse_slug_from_host("https://jobs.acme.com/open-roles"),
            Some("acme".to_string())
        );
        assert_eq!(
            greenhouse_slug_from_host("https://careers.widget.io"),
            Some("widget".to_string())
        );
        assert_eq!(greenhouse_slug_from_host("https://www.acme.com/careers"), None);
    }
}
