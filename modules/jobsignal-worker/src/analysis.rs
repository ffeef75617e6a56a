//! Source analysis: given a URL (plus optional fetch/search context),
//! classify it and produce a usable scraper config, or recommend disabling.
//!
//! Deterministic rules run first: single-listing and ATS-vendor URLs are
//! rejected outright, then the platform registry is consulted, then the
//! host heuristics; only when all of that fails does the optional LLM get
//! asked to classify a content sample.

use std::sync::Arc;
use std::time::Duration;

use ai_client::{extract_json, LlmAgent, TaskType};
use anyhow::Result;
use jobsignal_common::{extract_domain, SearchResult, SourceConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::platforms::{
    build_config_from_pattern, greenhouse_slug_from_host, is_ats_provider_url,
    is_single_job_listing_url, lever_slug_from_posting, match_platform,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    JobAggregator,
    CompanySpecific,
    SingleJobListing,
    AtsProviderSite,
    Invalid,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::JobAggregator => write!(f, "job_aggregator"),
            Classification::CompanySpecific => write!(f, "company_specific"),
            Classification::SingleJobListing => write!(f, "single_job_listing"),
            Classification::AtsProviderSite => write!(f, "ats_provider_site"),
            Classification::Invalid => write!(f, "invalid"),
        }
    }
}

/// How a discovery fetch attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchCategory {
    Success,
    AuthOrBotProtection,
    RateLimited,
    DnsError,
    FetchError,
}

#[derive(Debug, Clone)]
pub struct FetchContext {
    pub category: FetchCategory,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub sample: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub url: String,
    pub company_name: Option<String>,
    pub fetch: Option<FetchContext>,
    pub search_results: Vec<SearchResult>,
}

#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub classification: Classification,
    pub aggregator_domain: Option<String>,
    pub company_name: Option<String>,
    pub should_disable: bool,
    pub disable_reason: Option<String>,
    pub disable_notes: String,
    pub source_config: Option<SourceConfig>,
    pub confidence: f32,
    pub reasoning: String,
}

impl AnalysisResult {
    fn disabled(classification: Classification, reason: &str, notes: String) -> Self {
        Self {
            classification,
            aggregator_domain: None,
            company_name: None,
            should_disable: true,
            disable_reason: Some(reason.to_string()),
            disable_notes: notes,
            source_config: None,
            confidence: 0.95,
            reasoning: reason.to_string(),
        }
    }
}

pub struct SourceAnalyzer {
    http: reqwest::Client,
    agent: Option<Arc<dyn LlmAgent>>,
    /// Disables live verification probes (pattern configs are accepted as
    /// built). Intended for tests.
    pub probe_live: bool,
}

impl SourceAnalyzer {
    pub fn new(http: reqwest::Client, agent: Option<Arc<dyn LlmAgent>>) -> Self {
        Self {
            http,
            agent,
            probe_live: true,
        }
    }

    pub async fn analyze(&self, input: &AnalysisInput) -> Result<AnalysisResult> {
        let url = input.url.as_str();

        // Deterministic rejections first.
        if is_single_job_listing_url(url) {
            return Ok(AnalysisResult::disabled(
                Classification::SingleJobListing,
                "single_job_listing",
                format!("URL points to a single job listing, not a job board: {url}"),
            ));
        }
        if is_ats_provider_url(url) {
            return Ok(AnalysisResult::disabled(
                Classification::AtsProviderSite,
                "ats_provider_url",
                format!("URL points to an ATS provider's own site, not a customer board: {url}"),
            ));
        }

        // Known platform patterns build a config without any model call.
        if let Some(result) = self.try_pattern_detection(input).await? {
            return Ok(result);
        }

        // Heuristic probes, each verified by one live request.
        if let Some(result) = self.probe_lever_from_posting(input).await? {
            return Ok(result);
        }
        if let Some(result) = self.probe_greenhouse_from_host(input).await? {
            return Ok(result);
        }

        // Hard fetch failures of the "never going to work" kind.
        if let Some(fetch) = &input.fetch {
            match fetch.category {
                FetchCategory::AuthOrBotProtection => {
                    return Ok(AnalysisResult::disabled(
                        Classification::Invalid,
                        "auth_or_bot_protection",
                        format!("Fetch blocked by auth or bot protection: {url}"),
                    ));
                }
                FetchCategory::DnsError => {
                    return Ok(AnalysisResult::disabled(
                        Classification::Invalid,
                        "dns_error",
                        format!("Host does not resolve: {url}"),
                    ));
                }
                _ => {}
            }
        }

        // Last resort: ask the model to classify the sample or snippets.
        if let Some(result) = self.classify_with_agent(input).await {
            return Ok(result);
        }

        Ok(AnalysisResult::disabled(
            Classification::Invalid,
            "unresolvable",
            format!("Could not classify source or build a working config for {url}"),
        ))
    }

    async fn try_pattern_detection(
        &self,
        input: &AnalysisInput,
    ) -> Result<Option<AnalysisResult>> {
        let Some((pattern, raw)) = match_platform(&input.url) else {
            return Ok(None);
        };
        let config = match build_config_from_pattern(pattern, raw) {
            Ok(config) => config,
            Err(e) => {
                warn!(url = %input.url, pattern = pattern.name, error = %e, "Pattern config build failed");
                return Ok(None);
            }
        };

        if pattern.config_type == "api" && !self.verify_endpoint(&config).await {
            info!(url = %input.url, pattern = pattern.name, "Pattern endpoint failed verification");
            return Ok(None);
        }

        info!(url = %input.url, pattern = pattern.name, "Platform pattern matched");
        Ok(Some(AnalysisResult {
            classification: Classification::CompanySpecific,
            aggregator_domain: None,
            company_name: input.company_name.clone(),
            should_disable: false,
            disable_reason: None,
            disable_notes: String::new(),
            source_config: Some(config),
            confidence: 0.9,
            reasoning: format!("URL matches the {} platform pattern", pattern.name),
        }))
    }

    async fn probe_lever_from_posting(
        &self,
        input: &AnalysisInput,
    ) -> Result<Option<AnalysisResult>> {
        let Some(slug) = lever_slug_from_posting(&input.url) else {
            return Ok(None);
        };
        let board_url = format!("https://jobs.lever.co/{slug}");
        let Some((pattern, raw)) = match_platform(&board_url) else {
            return Ok(None);
        };
        let config = match build_config_from_pattern(pattern, raw) {
            Ok(config) => config,
            Err(_) => return Ok(None),
        };
        if !self.verify_endpoint(&config).await {
            return Ok(None);
        }

        info!(url = %input.url, slug, "Derived Lever board from single posting");
        Ok(Some(AnalysisResult {
            classification: Classification::CompanySpecific,
            aggregator_domain: None,
            company_name: input.company_name.clone().or(Some(slug)),
            should_disable: false,
            disable_reason: None,
            disable_notes: String::new(),
            source_config: Some(config),
            confidence: 0.8,
            reasoning: "Single Lever posting resolved to its board".to_string(),
        }))
    }

    async fn probe_greenhouse_from_host(
        &self,
        input: &AnalysisInput,
    ) -> Result<Option<AnalysisResult>> {
        let Some(slug) = greenhouse_slug_from_host(&input.url) else {
            return Ok(None);
        };
        let mut config = match jobsignal_scraper::expand_config(
            "greenhouse",
            serde_json::json!({"board_token": slug}),
        ) {
            Ok(config) => config,
            Err(_) => return Ok(None),
        };
        config
            .extra
            .insert("board_token".to_string(), serde_json::json!(slug));
        if !self.verify_endpoint(&config).await {
            return Ok(None);
        }

        info!(url = %input.url, slug, "Greenhouse probe succeeded for careers host");
        Ok(Some(AnalysisResult {
            classification: Classification::CompanySpecific,
            aggregator_domain: None,
            company_name: input.company_name.clone(),
            should_disable: false,
            disable_reason: None,
            disable_notes: String::new(),
            source_config: Some(config),
            confidence: 0.75,
            reasoning: "jobs./careers. host probed successfully against Greenhouse".to_string(),
        }))
    }

    /// One live test call against an API config. A 200 with a JSON body is
    /// a working endpoint.
    async fn verify_endpoint(&self, config: &SourceConfig) -> bool {
        if !self.probe_live {
            return true;
        }

        let is_post = config
            .method
            .as_deref()
            .map(|m| m.eq_ignore_ascii_case("post"))
            .unwrap_or(false);

        let request = if is_post {
            self.http
                .post(&config.url)
                .json(config.post_body.as_ref().unwrap_or(&serde_json::json!({})))
        } else {
            self.http.get(&config.url)
        };

        match request
            .header("Accept", "application/json")
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                matches!(resp.json::<serde_json::Value>().await, Ok(_))
            }
            _ => false,
        }
    }

    async fn classify_with_agent(&self, input: &AnalysisInput) -> Option<AnalysisResult> {
        let agent = self.agent.as_ref()?;

        let sample = input
            .fetch
            .as_ref()
            .and_then(|f| f.sample.clone())
            .unwrap_or_default();
        let snippets = input
            .search_results
            .iter()
            .take(3)
            .map(|r| format!("- {} ({}): {}", r.title, r.url, r.snippet))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Classify this job-related URL and, if it is scrapeable, produce a scraper config.\n\
             URL: {}\n\nPage sample (may be empty):\n{}\n\nSearch context (may be empty):\n{}\n\n\
             Respond with JSON only:\n\
             {{\"classification\": \"job_aggregator|company_specific|single_job_listing|ats_provider_site|invalid\",\n \
             \"aggregator_domain\": null, \"company_name\": null, \"should_disable\": false,\n \
             \"disable_reason\": null, \"confidence\": 0.5, \"reasoning\": \"...\",\n \
             \"config\": {{\"type\": \"api|rss|html\", \"url\": \"...\", \"response_path\": null,\n \
             \"fields\": {{\"title\": \"...\", \"url\": \"...\"}}, \"job_selector\": null}}}}",
            input.url,
            sample.chars().take(4000).collect::<String>(),
            snippets,
        );

        let response = agent
            .execute(TaskType::SourceAnalysis, &prompt, 1024, 0.0)
            .await
            .ok()?;
        let value = extract_json(&response)?;

        let classification = match value["classification"].as_str()? {
            "job_aggregator" => Classification::JobAggregator,
            "company_specific" => Classification::CompanySpecific,
            "single_job_listing" => Classification::SingleJobListing,
            "ats_provider_site" => Classification::AtsProviderSite,
            _ => Classification::Invalid,
        };

        let source_config = value
            .get("config")
            .filter(|c| c.is_object())
            .and_then(|c| SourceConfig::from_value(c.clone()).ok())
            .filter(|c| c.validate().is_ok());

        let should_disable = value["should_disable"].as_bool().unwrap_or(false)
            || source_config.is_none()
            || matches!(
                classification,
                Classification::SingleJobListing
                    | Classification::AtsProviderSite
                    | Classification::Invalid
            );

        let reasoning = value["reasoning"].as_str().unwrap_or_default().to_string();
        Some(AnalysisResult {
            classification,
            aggregator_domain: value["aggregator_domain"]
                .as_str()
                .map(str::to_string)
                .or_else(|| {
                    matches!(classification, Classification::JobAggregator)
                        .then(|| extract_domain(&input.url))
                }),
            company_name: value["company_name"].as_str().map(str::to_string),
            should_disable,
            disable_reason: value["disable_reason"].as_str().map(str::to_string),
            disable_notes: if should_disable {
                format!("LLM classification: {classification}; {reasoning}")
            } else {
                String::new()
            },
            source_config,
            confidence: value["confidence"].as_f64().unwrap_or(0.5) as f32,
            reasoning,
        })
    }
}

/// Categorize a discovery fetch attempt.
pub async fn attempt_fetch(http: &reqwest::Client, url: &str) -> FetchContext {
    let result = http
        .get(url)
        .header(
            "Accept",
            "application/json, application/rss+xml, application/xml, text/xml, text/html, */*",
        )
        .timeout(Duration::from_secs(30))
        .send()
        .await;

    match result {
        Ok(resp) => {
            let status = resp.status();
            let content_type = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            if status.is_success() {
                let sample = resp.text().await.unwrap_or_default();
                return FetchContext {
                    category: FetchCategory::Success,
                    status_code: Some(status.as_u16()),
                    content_type,
                    sample: Some(sample.chars().take(5000).collect()),
                };
            }

            let category = match status.as_u16() {
                401 | 403 => FetchCategory::AuthOrBotProtection,
                429 => FetchCategory::RateLimited,
                _ => FetchCategory::FetchError,
            };
            FetchContext {
                category,
                status_code: Some(status.as_u16()),
                content_type,
                sample: None,
            }
        }
        Err(e) => {
            let message = e.to_string().to_lowercase();
            let category = if message.contains("dns")
                || message.contains("name or service not known")
                || message.contains("failed to resolve")
            {
                FetchCategory::DnsError
            } else {
                FetchCategory::FetchError
            };
            FetchContext {
                category,
                status_code: None,
                content_type: None,
                sample: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> SourceAnalyzer {
        let mut analyzer = SourceAnalyzer::new(reqwest::Client::new(), None);
        analyzer.probe_live = false;
        analyzer
    }

    fn input(url: &str) -> AnalysisInput {
        AnalysisInput {
            url: url.to_string(),
            company_name: None,
            fetch: None,
            search_results: vec![],
        }
    }

    #[tokio::test]
    async fn single_listing_urls_are_disabled() {
        let result = analyzer()
            .analyze(&input(
                "https://remoteok.com/remote-jobs/remote-rust-engineer-acme-123456",
            ))
            .await
            .unwrap();
        assert_eq!(result.classification, Classification::SingleJobListing);
        assert!(result.should_disable);
        assert!(result.disable_notes.contains("single job listing"));
    }

    #[tokio::test]
    async fn ats_provider_sites_are_disabled() {
        let result = analyzer()
            .analyze(&input("https://greenhouse.com/careers"))
            .await
            .unwrap();
        assert_eq!(result.classification, Classification::AtsProviderSite);
        assert!(result.should_disable);
    }

    #[tokio::test]
    async fn greenhouse_board_builds_config() {
        let result = analyzer()
            .analyze(&input("https://boards.greenhouse.io/cloudflare"))
            .await
            .unwrap();
        assert_eq!(result.classification, Classification::CompanySpecific);
        assert!(!result.should_disable);
        let config = result.source_config.unwrap();
        assert!(config.url.contains("cloudflare"));
    }

    #[tokio::test]
    async fn lever_posting_resolves_board() {
        let result = analyzer()
            .analyze(&input("https://jobs.lever.co/paymentology/1234-abcd"))
            .await
            .unwrap();
        assert_eq!(result.classification, Classification::CompanySpecific);
        let config = result.source_config.unwrap();
        assert!(config.url.contains("api.lever.co/v0/postings/paymentology"));
    }

    #[tokio::test]
    async fn auth_blocked_fetch_disables() {
        let mut i = input("https://example.com/careers");
        i.fetch = Some(FetchContext {
            category: FetchCategory::AuthOrBotProtection,
            status_code: Some(403),
            content_type: None,
            sample: None,
        });
        let result = analyzer().analyze(&i).await.unwrap();
        assert!(result.should_disable);
        assert_eq!(result.disable_reason.as_deref(), Some("auth_or_bot_protection"));
    }

    #[tokio::test]
    async fn unresolvable_urls_are_invalid() {
        let result = analyzer()
            .analyze(&input("https://example.com/careers"))
            .await
            .unwrap();
        assert_eq!(result.classification, Classification::Invalid);
        assert!(result.should_disable);
    }
}
