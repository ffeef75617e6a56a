//! The generic pull-scraper: executes a [`SourceConfig`] against one
//! endpoint and returns normalized postings.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use browserless_client::BrowserlessClient;
use jobsignal_common::source_config::CompanyExtraction;
use jobsignal_common::{AuthType, Posting, ScrapingSettings, SourceConfig, SourceType};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{info, warn};

use crate::blocked::detect_blocked_response;
use crate::dates::normalize_date;
use crate::detail::{self, DetailFetch};
use crate::error::{Result, ScrapeError};
use crate::normalize::{
    company_from_title, company_website_from_description, format_salary, location_from_description,
    matches_company_filter, metadata_to_map, names_from_list, normalize_tags,
};
use crate::paths::{css_select, dot_access, navigate_path};
use crate::sanitize::{sanitize_company_name, sanitize_html_description, sanitize_title};

/// Hard cap on auto-pagination to avoid infinite offset walks.
const MAX_PAGES: usize = 50;

pub struct GenericScraper {
    config: SourceConfig,
    settings: ScrapingSettings,
    http: reqwest::Client,
    renderer: Option<Arc<BrowserlessClient>>,
    effective_url: OnceLock<String>,
}

impl GenericScraper {
    pub fn new(config: SourceConfig, settings: ScrapingSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.list_timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .expect("Failed to build HTTP client");

        Self {
            config,
            settings,
            http,
            renderer: None,
            effective_url: OnceLock::new(),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<BrowserlessClient>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// The request URL with any server-side company filter merged into the
    /// query string. Memoized per scraper instance.
    pub fn effective_url(&self) -> &str {
        self.effective_url.get_or_init(|| {
            let base = self.config.url.clone();
            let (Some(filter), Some(param)) = (
                self.config.company_filter.as_deref(),
                self.config.company_filter_param.as_deref(),
            ) else {
                return base;
            };

            match url::Url::parse(&base) {
                Ok(mut parsed) => {
                    let existing: Vec<(String, String)> = parsed
                        .query_pairs()
                        .filter(|(k, _)| k != param)
                        .map(|(k, v)| (k.into_owned(), v.into_owned()))
                        .collect();
                    {
                        let mut pairs = parsed.query_pairs_mut();
                        pairs.clear();
                        for (k, v) in existing {
                            pairs.append_pair(&k, &v);
                        }
                        pairs.append_pair(param, filter);
                    }
                    parsed.to_string()
                }
                Err(_) => base,
            }
        })
    }

    /// Scrape the configured source and return normalized postings.
    ///
    /// Fails with [`ScrapeError::Blocked`] when the source refuses us (the
    /// caller must disable it) or [`ScrapeError::Request`] on transport
    /// failures (the caller records a failure counter).
    pub async fn scrape(&self) -> Result<Vec<Posting>> {
        self.config
            .validate()
            .map_err(|e| ScrapeError::InvalidConfig(e.to_string()))?;

        let effective_url = self.effective_url().to_string();
        info!(
            source_type = %self.config.source_type,
            url = %effective_url,
            "Scraping source"
        );

        let mut postings = match self.config.source_type {
            SourceType::Api => {
                let items = self.fetch_json().await?;
                items
                    .iter()
                    .map(|item| self.assemble_posting(self.extract_api_fields(item)))
                    .collect()
            }
            SourceType::Rss => {
                let items = self.fetch_rss().await?;
                items
                    .iter()
                    .map(|item| self.assemble_posting(self.extract_rss_fields(item)))
                    .collect()
            }
            SourceType::Html => {
                let html = self.fetch_html().await?;
                self.extract_html_postings(&html)
            }
        };

        // Detail-page enrichment, sequential with rate limiting.
        for posting in postings.iter_mut() {
            if !posting.url.is_empty() && detail::should_enrich(&self.config, posting) {
                self.enrich_posting(posting).await;
            }
        }

        postings.retain(|p| !p.title.is_empty() && !p.url.is_empty());

        if let Some(filter) = self.config.company_filter.as_deref() {
            let before = postings.len();
            postings.retain(|p| matches_company_filter(&p.company, filter));
            info!(
                filter,
                matched = postings.len(),
                total = before,
                "Applied company filter"
            );
        }

        info!(count = postings.len(), url = %effective_url, "Scrape complete");
        Ok(postings)
    }

    // --- Transports ---

    async fn fetch_json(&self) -> Result<Vec<Value>> {
        if self.should_paginate_post() {
            return self.fetch_json_paginated().await;
        }

        let (headers, url) = self.auth_headers(self.effective_url().to_string());

        let response = if self.is_post() {
            self.http
                .post(&url)
                .headers(headers)
                .json(self.config.post_body.as_ref().unwrap_or(&Value::Null))
                .send()
                .await?
        } else {
            self.http.get(&url).headers(headers).send().await?
        };

        self.check_status(response.status())?;
        let body = response.text().await?;
        let data = self.parse_json_body(&body)?;
        Ok(navigate_path(&data, self.config.response_path.as_deref()))
    }

    /// Auto-paginate POST APIs whose body declares both `offset` and `limit`.
    /// Auth is reapplied on every page; a short page ends the walk.
    async fn fetch_json_paginated(&self) -> Result<Vec<Value>> {
        let base_body = self
            .config
            .post_body
            .as_ref()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();

        let limit = int_or_default(base_body.get("limit"), 20).max(1);
        let mut offset = int_or_default(base_body.get("offset"), 0);
        let mut results = Vec::new();

        for page in 0..MAX_PAGES {
            let (headers, url) = self.auth_headers(self.effective_url().to_string());

            let mut payload = base_body.clone();
            payload.insert("offset".to_string(), Value::from(offset));
            payload.insert("limit".to_string(), Value::from(limit));

            let response = self
                .http
                .post(&url)
                .headers(headers)
                .json(&Value::Object(payload))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(ScrapeError::Blocked(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("request failed")
                )));
            }

            let body = response.text().await?;
            let data = self.parse_json_body(&body)?;
            let items = navigate_path(&data, self.config.response_path.as_deref());
            if items.is_empty() {
                break;
            }

            let page_len = items.len();
            results.extend(items);

            if page_len < limit as usize {
                break;
            }
            offset += limit;

            if page + 1 == MAX_PAGES {
                warn!(
                    url = %self.config.url,
                    max_pages = MAX_PAGES,
                    "Pagination hit the page cap; results may be truncated"
                );
            }
        }

        Ok(results)
    }

    fn is_post(&self) -> bool {
        self.config
            .method
            .as_deref()
            .map(|m| m.eq_ignore_ascii_case("post"))
            .unwrap_or(false)
    }

    fn should_paginate_post(&self) -> bool {
        if !self.is_post() {
            return false;
        }
        self.config
            .post_body
            .as_ref()
            .and_then(Value::as_object)
            .map(|body| body.contains_key("offset") && body.contains_key("limit"))
            .unwrap_or(false)
    }

    fn parse_json_body(&self, body: &str) -> Result<Value> {
        serde_json::from_str(body).map_err(|e| {
            match detect_blocked_response(body, &e.to_string()) {
                Some(reason) => ScrapeError::Blocked(reason),
                None => ScrapeError::Parse(format!("invalid JSON response: {e}")),
            }
        })
    }

    async fn fetch_rss(&self) -> Result<Vec<Value>> {
        let (headers, url) = self.auth_headers(self.effective_url().to_string());
        let response = self.http.get(&url).headers(headers).send().await?;
        self.check_status(response.status())?;

        let body = response.text().await?;
        match feed_rs::parser::parse(body.as_bytes()) {
            Ok(feed) if !feed.entries.is_empty() => {
                Ok(feed.entries.iter().map(entry_to_value).collect())
            }
            Ok(_) => {
                if let Some(reason) = detect_blocked_response(&body, "feed has no entries") {
                    return Err(ScrapeError::Blocked(reason));
                }
                warn!(url = %self.config.url, "Feed parsed but contains no entries");
                Ok(Vec::new())
            }
            Err(e) => {
                if let Some(reason) = detect_blocked_response(&body, &e.to_string()) {
                    return Err(ScrapeError::Blocked(reason));
                }
                Err(ScrapeError::Parse(format!("feed parse failed: {e}")))
            }
        }
    }

    async fn fetch_html(&self) -> Result<String> {
        if self.config.requires_js {
            let renderer = self.renderer.as_ref().ok_or_else(|| {
                ScrapeError::InvalidConfig(
                    "requires_js is set but no headless renderer is configured".to_string(),
                )
            })?;
            let result = renderer
                .render(
                    self.effective_url(),
                    self.config.render_wait_for.as_deref(),
                    self.config.render_timeout_ms.unwrap_or(30_000),
                )
                .await
                .map_err(|e| ScrapeError::Request(e.to_string()))?;
            if (400..500).contains(&result.status) {
                return Err(ScrapeError::Blocked(format!(
                    "HTTP {} from headless render",
                    result.status
                )));
            }
            return Ok(result.html);
        }

        let (headers, url) = self.auth_headers(self.effective_url().to_string());
        let response = self.http.get(&url).headers(headers).send().await?;
        self.check_status(response.status())?;
        Ok(response.text().await?)
    }

    // --- Auth & status ---

    /// Build request headers (defaults + config + auth) and possibly extend
    /// the URL for query-parameter auth.
    fn auth_headers(&self, mut url: String) -> (HeaderMap, String) {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json, text/html, */*"),
        );
        for (name, value) in &self.config.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        if let Some(api_key) = self.config.api_key.as_deref() {
            match self.config.auth_type {
                Some(AuthType::Bearer) => {
                    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
                        headers.insert(reqwest::header::AUTHORIZATION, value);
                    }
                }
                Some(AuthType::Header) => {
                    if let Some(param) = self.config.auth_param.as_deref() {
                        if let (Ok(name), Ok(value)) =
                            (HeaderName::try_from(param), HeaderValue::from_str(api_key))
                        {
                            headers.insert(name, value);
                        }
                    }
                }
                Some(AuthType::Query) => {
                    if let Some(param) = self.config.auth_param.as_deref() {
                        let sep = if url.contains('?') { '&' } else { '?' };
                        url = format!("{url}{sep}{param}={api_key}");
                    }
                }
                None => {}
            }
        }

        (headers, url)
    }

    fn check_status(&self, status: StatusCode) -> Result<()> {
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
        Ok(())
    }

    // --- Field extraction ---

    fn extract_api_fields(&self, item: &Value) -> BTreeMap<String, Value> {
        let mut raw = BTreeMap::new();
        for (field, path) in &self.config.fields {
            if let Some(value) = dot_access(item, path) {
                raw.insert(field.clone(), value);
            }
        }
        self.extract_salary_range(item, &mut raw);
        raw
    }

    fn extract_rss_fields(&self, item: &Value) -> BTreeMap<String, Value> {
        let mut raw = BTreeMap::new();
        for (field, path) in &self.config.fields {
            if let Some(value) = rss_access(item, path) {
                raw.insert(field.clone(), value);
            }
        }
        raw
    }

    fn extract_salary_range(&self, item: &Value, raw: &mut BTreeMap<String, Value>) {
        if let Some(min_path) = self.config.salary_min_field.as_deref() {
            if let Some(min_val) = dot_access(item, min_path) {
                let max_val = self
                    .config
                    .salary_max_field
                    .as_deref()
                    .and_then(|p| dot_access(item, p));
                let formatted = format_salary(&min_val, max_val.as_ref());
                if !formatted.is_empty() {
                    raw.insert("salary".to_string(), Value::String(formatted));
                }
                raw.insert("salary_min".to_string(), min_val);
                if let Some(max_val) = max_val {
                    raw.insert("salary_max".to_string(), max_val);
                }
            }
        }
    }

    /// Parse an HTML document and extract one posting per `job_selector`
    /// match. Synchronous: the parsed DOM never crosses an await point.
    fn extract_html_postings(&self, html: &str) -> Vec<Posting> {
        let selector = match self
            .config
            .job_selector
            .as_deref()
            .and_then(|s| scraper::Selector::parse(s).ok())
        {
            Some(sel) => sel,
            None => {
                warn!(url = %self.config.url, "job_selector missing or invalid");
                return Vec::new();
            }
        };

        let document = scraper::Html::parse_document(html);
        document
            .select(&selector)
            .map(|element| {
                let mut raw = BTreeMap::new();
                for (field, sel) in &self.config.fields {
                    if let Some(value) = css_select(element, sel) {
                        raw.insert(field.clone(), Value::String(value));
                    }
                }
                self.assemble_posting(raw)
            })
            .collect()
    }

    /// Post-process raw field values into a normalized posting.
    fn assemble_posting(&self, raw: BTreeMap<String, Value>) -> Posting {
        let mut posting = Posting::default();

        for (field, value) in &raw {
            match field.as_str() {
                "title" => posting.title = sanitize_title(&value_to_string(value)),
                "url" => posting.url = value_to_string(value),
                "company" => posting.company = sanitize_company_name(&value_to_string(value)),
                "location" => posting.location = value_to_string(value),
                "description" => {
                    posting.description = sanitize_html_description(&value_to_string(value))
                }
                "posted_date" => {
                    let normalized = normalize_date(value);
                    if !normalized.is_empty() {
                        posting.posted_date = Some(normalized);
                    }
                }
                "salary" => {
                    let salary = value_to_string(value);
                    if !salary.is_empty() {
                        posting.salary = Some(salary);
                    }
                }
                "tags" => posting.tags = normalize_tags(value),
                "metadata" => posting.metadata = metadata_to_map(value),
                "departments" => posting.departments = names_from_list(value),
                "offices" => posting.offices = names_from_list(value),
                "company_website" => {
                    let website = value_to_string(value);
                    if !website.is_empty() {
                        posting.company_website = Some(website);
                    }
                }
                "employment_type" => {
                    let emp = value_to_string(value);
                    if !emp.is_empty() {
                        posting.employment_type = Some(emp);
                    }
                }
                "salary_min" => posting.salary_min = value.as_i64(),
                "salary_max" => posting.salary_max = value.as_i64(),
                "is_remote" => posting.is_remote = value.as_bool(),
                _ => {}
            }
        }

        // Configured company name wins over anything extracted.
        if let Some(name) = self.config.company_name.as_deref() {
            posting.company = name.to_string();
        }

        // Join relative URLs against base_url with exactly one slash.
        if let Some(base) = self.config.base_url.as_deref() {
            if !posting.url.is_empty() && !posting.url.starts_with("http") {
                posting.url = format!(
                    "{}/{}",
                    base.trim_end_matches('/'),
                    posting.url.trim_start_matches('/')
                );
            }
        }

        // Aggregator fallbacks: "Vendor: Role" titles, URL/Headquarters stanzas.
        if posting.company.is_empty()
            && self.config.company_extraction == Some(CompanyExtraction::FromTitle)
            && !posting.title.is_empty()
        {
            if let Some((company, title)) = company_from_title(&posting.title) {
                posting.company = sanitize_company_name(&company);
                posting.title = sanitize_title(&title);
            }
        }

        if matches!(
            self.config.company_extraction,
            Some(CompanyExtraction::FromTitle) | Some(CompanyExtraction::FromDescription)
        ) && posting.company_website.is_none()
            && !posting.description.is_empty()
        {
            // Website markup is stripped by description sanitization, so look
            // in the raw value.
            if let Some(desc_raw) = raw.get("description") {
                posting.company_website =
                    company_website_from_description(&value_to_string(desc_raw));
            }
        }

        if posting.location.is_empty() && !posting.description.is_empty() {
            if let Some(location) = location_from_description(&posting.description) {
                posting.location = location;
            }
        }

        posting
    }

    // --- Detail enrichment ---

    async fn enrich_posting(&self, posting: &mut Posting) {
        let outcome = detail::enrich(
            &self.http,
            &self.config,
            &self.settings,
            posting,
        )
        .await;

        match outcome {
            DetailFetch::Enriched => {}
            DetailFetch::Miss(reason) => {
                info!(url = %posting.url, reason, "Detail enrichment miss");
            }
            DetailFetch::Blocked(reason) => {
                warn!(url = %posting.url, reason, "Detail page blocked; keeping list data");
            }
        }
    }
}

fn int_or_default(value: Option<&Value>, default: i64) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
        Some(Value::String(s)) if !s.is_empty() => s.parse().unwrap_or(default),
        _ => default,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Flatten a feed entry into the canonical key set the field map addresses.
fn entry_to_value(entry: &feed_rs::model::Entry) -> Value {
    serde_json::json!({
        "id": entry.id,
        "title": entry.title.as_ref().map(|t| t.content.clone()),
        "link": entry.links.first().map(|l| l.href.clone()),
        "summary": entry.summary.as_ref().map(|s| s.content.clone()),
        "content": entry.content.as_ref().and_then(|c| c.body.clone()),
        "published": entry.published.map(|d| d.to_rfc3339()),
        "updated": entry.updated.map(|d| d.to_rfc3339()),
        "author": entry.authors.first().map(|a| a.name.clone()),
        "categories": entry.categories.iter().map(|c| c.term.clone()).collect::<Vec<_>>(),
    })
}

/// Feed access with the conventional fallback chains: `description` falls
/// back to `summary`/`content`, `url` to `link`/`id`, `posted_date` to
/// `published`/`updated`.
fn rss_access(item: &Value, path: &str) -> Option<Value> {
    if let Some(value) = dot_access(item, path) {
        return Some(value);
    }

    let fallbacks: &[&str] = match path {
        "description" => &["summary", "content"],
        "url" => &["link", "id"],
        "posted_date" => &["published", "updated", "created"],
        "tags" => &["categories"],
        _ => &[],
    };

    for fallback in fallbacks {
        if let Some(value) = dot_access(item, fallback) {
            if !matches!(&value, Value::Array(items) if items.is_empty()) {
                return Some(value);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn api_config() -> SourceConfig {
        let mut config = SourceConfig::new(SourceType::Api, "https://api.example.com/jobs");
        config.fields.insert("title".into(), "title".into());
        config.fields.insert("url".into(), "absolute_url".into());
        config.fields.insert("location".into(), "location.name".into());
        config.fields.insert("metadata".into(), "metadata".into());
        config
    }

    fn scraper_for(config: SourceConfig) -> GenericScraper {
        GenericScraper::new(config, ScrapingSettings::default())
    }

    #[test]
    fn effective_url_merges_company_filter() {
        let mut config = api_config();
        config.url = "https://remotive.com/api/remote-jobs?limit=50".to_string();
        config.company_filter = Some("Acme".to_string());
        config.company_filter_param = Some("company_name".to_string());

        let scraper = scraper_for(config);
        let url = scraper.effective_url();
        assert!(url.contains("limit=50"), "existing params preserved: {url}");
        assert!(url.contains("company_name=Acme"), "filter merged: {url}");
    }

    #[test]
    fn effective_url_unchanged_without_filter_param() {
        let mut config = api_config();
        config.company_filter = Some("Acme".to_string());
        let scraper = scraper_for(config);
        assert_eq!(scraper.effective_url(), "https://api.example.com/jobs");
    }

    #[test]
    fn assemble_posting_normalizes_fields() {
        let scraper = scraper_for(api_config());
        let item = json!({
            "title": "  Senior <b>Engineer</b> ",
            "absolute_url": "https://example.com/jobs/1",
            "location": {"name": "Lisbon, Portugal"},
            "metadata": [{"name": "Location Type", "value": "Remote"}],
        });
        let posting = scraper.assemble_posting(scraper.extract_api_fields(&item));
        assert_eq!(posting.title, "Senior Engineer");
        assert_eq!(posting.location, "Lisbon, Portugal");
        assert_eq!(
            posting.metadata.get("Location Type").map(String::as_str),
            Some("Remote")
        );
    }

    #[test]
    fn assemble_posting_joins_relative_urls() {
        let mut config = api_config();
        config.base_url = Some("https://example.com/".to_string());
        let scraper = scraper_for(config);
        let item = json!({"title": "Engineer", "absolute_url": "/jobs/42"});
        let posting = scraper.assemble_posting(scraper.extract_api_fields(&item));
        assert_eq!(posting.url, "https://example.com/jobs/42");
    }

    #[test]
    fn assemble_posting_company_name_override() {
        let mut config = api_config();
        config.fields.insert("company".into(), "company".into());
        config.company_name = Some("Acme".to_string());
        let scraper = scraper_for(config);
        let item = json!({"title": "Engineer", "absolute_url": "x", "company": "Wrong Name"});
        let posting = scraper.assemble_posting(scraper.extract_api_fields(&item));
        assert_eq!(posting.company, "Acme");
    }

    #[test]
    fn assemble_posting_extracts_company_from_title() {
        let mut config = api_config();
        config.company_extraction = Some(CompanyExtraction::FromTitle);
        let scraper = scraper_for(config);
        let item = json!({"title": "Toptal: Android Developer", "absolute_url": "x"});
        let posting = scraper.assemble_posting(scraper.extract_api_fields(&item));
        assert_eq!(posting.company, "Toptal");
        assert_eq!(posting.title, "Android Developer");
    }

    #[test]
    fn assemble_posting_formats_structured_salary() {
        let mut config = api_config();
        config.salary_min_field = Some("salary.min".to_string());
        config.salary_max_field = Some("salary.max".to_string());
        let scraper = scraper_for(config);
        let item = json!({
            "title": "Engineer",
            "absolute_url": "x",
            "salary": {"min": 100000, "max": 150000},
        });
        let posting = scraper.assemble_posting(scraper.extract_api_fields(&item));
        assert_eq!(posting.salary.as_deref(), Some("$100,000 - $150,000"));
    }

    #[test]
    fn unix_timestamps_normalize_by_digit_count() {
        let mut config = api_config();
        config.fields.insert("posted_date".into(), "date".into());
        let scraper = scraper_for(config);

        let seconds = json!({"title": "E", "absolute_url": "x", "date": 1752761621});
        let posting = scraper.assemble_posting(scraper.extract_api_fields(&seconds));
        assert!(posting.posted_date.unwrap().starts_with("2025"));

        let millis = json!({"title": "E", "absolute_url": "x", "date": 1752761621698_i64});
        let posting = scraper.assemble_posting(scraper.extract_api_fields(&millis));
        assert!(posting.posted_date.unwrap().starts_with("2025"));
    }

    #[test]
    fn html_extraction_uses_job_selector() {
        let mut config = SourceConfig::new(SourceType::Html, "https://example.com/careers");
        config.job_selector = Some(".job".to_string());
        config.fields.insert("title".into(), ".title".into());
        config.fields.insert("url".into(), "a@href".into());
        let scraper = scraper_for(config);

        let html = r#"
            <div class="job"><span class="title">Backend Engineer</span><a href="/jobs/1">go</a></div>
            <div class="job"><span class="title">Data Engineer</span><a href="/jobs/2">go</a></div>
        "#;
        let postings = scraper.extract_html_postings(html);
        assert_eq!(postings.len(), 2);
        assert_eq!(postings[0].title, "Backend Engineer");
        assert_eq!(postings[1].url, "/jobs/2");
    }

    #[test]
    fn rss_fallback_chain() {
        let entry = json!({
            "title": "Engineer",
            "link": "https://example.com/1",
            "summary": "Summary text",
            "published": "2025-07-01T00:00:00Z",
        });
        assert_eq!(
            rss_access(&entry, "description"),
            Some(json!("Summary text"))
        );
        assert_eq!(rss_access(&entry, "url"), Some(json!("https://example.com/1")));
        assert_eq!(
            rss_access(&entry, "posted_date"),
            Some(json!("2025-07-01T00:00:00Z"))
        );
        assert_eq!(rss_access(&entry, "missing"), None);
    }

    #[test]
    fn pagination_trigger_requires_post_with_offset_and_limit() {
        let mut config = api_config();
        assert!(!scraper_for(config.clone()).should_paginate_post());

        config.method = Some("POST".to_string());
        config.post_body = Some(json!({"offset": 0, "limit": 20}));
        assert!(scraper_for(config.clone()).should_paginate_post());

        config.post_body = Some(json!({"query": "x"}));
        assert!(!scraper_for(config).should_paginate_post());
    }

    #[test]
    fn query_auth_appends_to_url() {
        let mut config = api_config();
        config.auth_type = Some(AuthType::Query);
        config.auth_param = Some("api_key".to_string());
        config.api_key = Some("secret".to_string());
        let scraper = scraper_for(config);
        let (_, url) = scraper.auth_headers("https://api.example.com/jobs".to_string());
        assert_eq!(url, "https://api.example.com/jobs?api_key=secret");

        let (_, url) = scraper.auth_headers("https://api.example.com/jobs?a=1".to_string());
        assert_eq!(url, "https://api.example.com/jobs?a=1&api_key=secret");
    }

    #[test]
    fn bearer_auth_sets_header() {
        let mut config = api_config();
        config.auth_type = Some(AuthType::Bearer);
        config.api_key = Some("secret".to_string());
        let scraper = scraper_for(config);
        let (headers, _) = scraper.auth_headers("https://api.example.com".to_string());
        assert_eq!(
            headers.get(reqwest::header::AUTHORIZATION).unwrap(),
            "Bearer secret"
        );
    }
}
