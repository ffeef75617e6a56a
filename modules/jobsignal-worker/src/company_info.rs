//! Search-first company enrichment.
//!
//! Search by company name is the primary data source; URLs are hints. A
//! job-board or search-engine URL is never accepted as a company website.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ai_client::{extract_json, LlmAgent, TaskType};
use anyhow::Result;
use jobsignal_common::{is_search_engine_url, SearchResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::search::WebSearcher;

/// Workday sub-domains are stock tickers and abbreviations more often than
/// company names.
pub fn workday_company_map() -> &'static BTreeMap<&'static str, &'static str> {
    static MAP: OnceLock<BTreeMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| {
        BTreeMap::from([
            ("mdlz", "Mondelez International"),
            ("nvidia", "NVIDIA"),
            ("msft", "Microsoft"),
            ("goog", "Google"),
            ("amzn", "Amazon"),
            ("meta", "Meta"),
            ("aapl", "Apple"),
            ("ibm", "IBM"),
            ("intc", "Intel"),
            ("csco", "Cisco"),
            ("orcl", "Oracle"),
            ("sap", "SAP"),
            ("crm", "Salesforce"),
            ("adbe", "Adobe"),
            ("vmw", "VMware"),
            ("dell", "Dell"),
            ("hpe", "Hewlett Packard Enterprise"),
            ("wmt", "Walmart"),
            ("tgt", "Target"),
            ("cost", "Costco"),
        ])
    })
}

/// Short names that collide with more famous entities; the search query
/// gets a disambiguating hint appended.
fn ambiguous_name_hints() -> &'static BTreeMap<&'static str, &'static str> {
    static MAP: OnceLock<BTreeMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| {
        BTreeMap::from([
            ("apollo", "software company"),
            ("mercury", "fintech company"),
            ("anchor", "software company"),
            ("notion", "productivity software"),
            ("bolt", "technology company"),
            ("brex", "fintech company"),
        ])
    })
}

/// Context from a job source that sharpens searches.
#[derive(Debug, Clone, Default)]
pub struct SourceContext {
    pub aggregator_domain: Option<String>,
    pub base_url: Option<String>,
}

/// Normalized company facts with typed defaults. Keys are fixed; absence is
/// an empty value, never a missing key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanyInfo {
    pub name: String,
    pub website: String,
    pub about: String,
    pub culture: String,
    pub mission: String,
    pub industry: String,
    pub headquarters: String,
    pub employee_count: Option<i32>,
    pub is_remote_first: bool,
    pub ai_ml_focus: bool,
    pub tech_stack: Vec<String>,
}

impl CompanyInfo {
    /// True when nothing beyond the name came back; callers fall back to a
    /// bare stub instead of upserting an empty record.
    pub fn is_empty(&self) -> bool {
        self.website.trim().is_empty()
            && self.about.trim().is_empty()
            && self.culture.trim().is_empty()
    }

    /// Shape the facts into a store record. The store replaces the id on
    /// upsert and recomputes data quality from the merged record.
    pub fn to_company_record(&self, name: &str) -> jobsignal_common::Company {
        let none_if_empty = |s: &str| (!s.trim().is_empty()).then(|| s.to_string());
        jobsignal_common::Company {
            id: uuid::Uuid::nil(),
            name: name.to_string(),
            website: none_if_empty(&self.website),
            about: none_if_empty(&self.about),
            culture: none_if_empty(&self.culture),
            mission: none_if_empty(&self.mission),
            headquarters: none_if_empty(&self.headquarters),
            employee_count: self.employee_count,
            tech_stack: self.tech_stack.clone(),
            is_remote_first: self.is_remote_first,
            industry: none_if_empty(&self.industry),
            tier: None,
            priority_score: None,
            data_quality: jobsignal_common::DataQuality::Minimal,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }
}

pub struct CompanyInfoFetcher {
    http: reqwest::Client,
    search: Option<Arc<dyn WebSearcher>>,
    agent: Option<Arc<dyn LlmAgent>>,
}

impl CompanyInfoFetcher {
    pub fn new(
        http: reqwest::Client,
        search: Option<Arc<dyn WebSearcher>>,
        agent: Option<Arc<dyn LlmAgent>>,
    ) -> Self {
        Self {
            http,
            search,
            agent,
        }
    }

    /// Fetch company information. `is_job_board` lets the caller inject the
    /// registry's aggregator-domain knowledge without a store dependency.
    pub async fn fetch_company_info(
        &self,
        company_name: &str,
        url_hint: Option<&str>,
        source_context: Option<&SourceContext>,
        is_job_board: impl Fn(&str) -> bool,
    ) -> CompanyInfo {
        info!(company = company_name, "Fetching company info");

        // A Workday sub-domain names the company better than the feed does.
        let search_name = source_context
            .and_then(|ctx| ctx.base_url.as_deref())
            .and_then(company_from_workday_url)
            .filter(|better| !better.eq_ignore_ascii_case(company_name))
            .unwrap_or_else(|| company_name.to_string());

        let mut result = CompanyInfo {
            name: company_name.to_string(),
            ..Default::default()
        };

        if let Some(extracted) = self.search_and_extract(&search_name, source_context).await {
            merge_info(&mut result, extracted);
        }

        // Website selection: extracted wins; a hint is acceptable only when
        // it is neither a job board nor a search engine.
        if result.website.is_empty() {
            if let Some(hint) = url_hint {
                if !is_job_board(hint) && !is_search_engine_url(hint) {
                    result.website = hint.to_string();
                }
            }
        }

        // Thin results get one website scrape as a supplement.
        if !result.website.is_empty()
            && result.about.len() < 200
            && !is_search_engine_url(&result.website)
        {
            if let Some(scraped) = self.scrape_website(&result.website, &search_name).await {
                merge_info(&mut result, scraped);
            }
        }

        info!(
            company = company_name,
            about_chars = result.about.len(),
            culture_chars = result.culture.len(),
            "Company info assembled"
        );
        result
    }

    async fn search_and_extract(
        &self,
        company_name: &str,
        source_context: Option<&SourceContext>,
    ) -> Option<CompanyInfo> {
        let Some(search) = self.search.as_ref() else {
            debug!("No search client configured");
            return self.fallback_agent_lookup(company_name).await;
        };

        let queries = build_search_queries(company_name, source_context);
        let mut results: Vec<SearchResult> = Vec::new();
        for query in &queries {
            match search.search(query, 8).await {
                Ok(found) if has_quality_results(&found, company_name) => {
                    results = found;
                    break;
                }
                Ok(found) => {
                    if results.is_empty() {
                        results = found;
                    }
                }
                Err(e) => debug!(query, error = %e, "Search query failed"),
            }
        }

        if results.is_empty() {
            warn!(company = company_name, "No search results");
            return self.fallback_agent_lookup(company_name).await;
        }

        let context = format_search_results(&results);
        if self.agent.is_some() {
            if let Some(extracted) = self.extract_with_agent(company_name, &context).await {
                return Some(extracted);
            }
        }
        Some(extract_with_heuristics(&context))
    }

    async fn extract_with_agent(&self, company_name: &str, context: &str) -> Option<CompanyInfo> {
        let agent = self.agent.as_ref()?;
        let hint = ambiguous_name_hints()
            .get(company_name.to_lowercase().as_str())
            .map(|h| format!(" (the {h})"))
            .unwrap_or_default();

        let prompt = format!(
            "Extract facts about the company \"{company_name}\"{hint} from these search results.\n\n\
             {context}\n\nRespond with JSON only:\n\
             {{\"website\": \"\", \"about\": \"\", \"culture\": \"\", \"mission\": \"\",\n \
             \"industry\": \"\", \"headquarters\": \"\", \"employeeCount\": null,\n \
             \"isRemoteFirst\": false, \"aiMlFocus\": false, \"techStack\": []}}"
        );

        let response = agent
            .execute(TaskType::CompanyExtraction, &prompt, 1024, 0.0)
            .await
            .ok()?;
        let value = extract_json(&response)?;
        serde_json::from_value(value).ok()
    }

    /// No search client: ask the model directly, if there is one.
    async fn fallback_agent_lookup(&self, company_name: &str) -> Option<CompanyInfo> {
        let agent = self.agent.as_ref()?;
        let prompt = format!(
            "What do you know about the company \"{company_name}\"? Respond with JSON only:\n\
             {{\"website\": \"\", \"about\": \"\", \"culture\": \"\", \"mission\": \"\",\n \
             \"industry\": \"\", \"headquarters\": \"\", \"employeeCount\": null,\n \
             \"isRemoteFirst\": false, \"aiMlFocus\": false, \"techStack\": []}}"
        );
        let response = agent
            .execute(TaskType::CompanyExtraction, &prompt, 1024, 0.2)
            .await
            .ok()?;
        serde_json::from_value(extract_json(&response)?).ok()
    }

    async fn scrape_website(&self, website: &str, company_name: &str) -> Option<CompanyInfo> {
        let response = self
            .http
            .get(website)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let html = response.text().await.ok()?;
        let text = jobsignal_scraper::sanitize::sanitize_html_description(&html);
        let text: String = text.chars().take(8_000).collect();

        if self.agent.is_some() {
            if let Some(extracted) = self.extract_with_agent(company_name, &text).await {
                return Some(extracted);
            }
        }
        Some(extract_with_heuristics(&text))
    }
}

/// Merge: incoming values win only when non-empty.
fn merge_info(base: &mut CompanyInfo, incoming: CompanyInfo) {
    let pick = |target: &mut String, candidate: String| {
        if !candidate.trim().is_empty() {
            *target = candidate;
        }
    };
    pick(&mut base.website, incoming.website);
    pick(&mut base.about, incoming.about);
    pick(&mut base.culture, incoming.culture);
    pick(&mut base.mission, incoming.mission);
    pick(&mut base.industry, incoming.industry);
    pick(&mut base.headquarters, incoming.headquarters);
    if incoming.employee_count.is_some() {
        base.employee_count = incoming.employee_count;
    }
    base.is_remote_first |= incoming.is_remote_first;
    base.ai_ml_focus |= incoming.ai_ml_focus;
    if !incoming.tech_stack.is_empty() {
        base.tech_stack = incoming.tech_stack;
    }
}

/// Ranked search queries: Workday sub-domain first, then exact quoted,
/// standard-with-context, optional aggregator hint, careers page.
pub fn build_search_queries(
    company_name: &str,
    source_context: Option<&SourceContext>,
) -> Vec<String> {
    let mut queries = Vec::new();

    if let Some(base_url) = source_context.and_then(|c| c.base_url.as_deref()) {
        if base_url.contains("myworkdayjobs.com") {
            if let Some(subdomain) = workday_subdomain(base_url) {
                if !subdomain.eq_ignore_ascii_case(company_name) {
                    queries.push(format!("{subdomain} company official website about"));
                }
            }
        }
    }

    queries.push(format!("\"{company_name}\" company official website"));
    queries.push(format!("{company_name} company about headquarters employees"));

    if let Some(aggregator) = source_context.and_then(|c| c.aggregator_domain.as_deref()) {
        if ["greenhouse.io", "lever.co", "ashbyhq.com"].contains(&aggregator) {
            queries.push(format!("{company_name} tech startup company"));
        }
    }

    queries.push(format!("{company_name} company careers about us"));
    queries
}

/// Quality gate: at least two signals of name/company-context across the
/// top five results.
pub fn has_quality_results(results: &[SearchResult], company_name: &str) -> bool {
    if results.is_empty() {
        return false;
    }
    let company_lower = company_name.to_lowercase();
    let mut relevant = 0;

    for result in results.iter().take(5) {
        let title = result.title.to_lowercase();
        let snippet = result.snippet.to_lowercase();
        if title.contains(&company_lower) || snippet.contains(&company_lower) {
            relevant += 1;
        }
        if ["company", "about", "careers", "jobs", "headquarters"]
            .iter()
            .any(|term| title.contains(term) || snippet.contains(term))
        {
            relevant += 1;
        }
    }

    relevant >= 2
}

fn format_search_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| format!("Title: {}\nURL: {}\nSnippet: {}\n", r.title, r.url, r.snippet))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Deterministic extraction from text when no model is configured.
pub fn extract_with_heuristics(content: &str) -> CompanyInfo {
    let mut info = CompanyInfo::default();
    let content_lower = content.to_lowercase();

    let sections: [(&str, &[&str]); 3] = [
        ("mission", &["our mission", "mission statement", "our purpose"]),
        ("culture", &["our culture", "our values", "work environment"]),
        ("about", &["about us", "who we are", "what we do"]),
    ];
    // Indices come from the lowercased text; slicing the original is only
    // safe when lowercasing was byte-for-byte.
    let source: &str = if content.len() == content_lower.len() {
        content
    } else {
        &content_lower
    };

    for (field, patterns) in sections {
        for pattern in patterns {
            if let Some(start) = content_lower.find(pattern) {
                let start = clamp_boundary(source, start);
                let end = clamp_boundary(source, (start + 500).min(source.len()));
                let snippet: String = source[start..end]
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ");
                let snippet = snippet.chars().take(300).collect::<String>();
                match field {
                    "mission" => info.mission = snippet,
                    "culture" => info.culture = snippet,
                    _ => info.about = snippet,
                }
                break;
            }
        }
    }

    if info.about.is_empty() && content.len() > 100 {
        info.about = content
            .chars()
            .take(300)
            .collect::<String>()
            .trim()
            .to_string();
    }

    info.is_remote_first = ["remote-first", "fully remote", "distributed team"]
        .iter()
        .any(|p| content_lower.contains(p));
    info.ai_ml_focus = ["machine learning", "artificial intelligence", "ai-powered"]
        .iter()
        .any(|p| content_lower.contains(p));

    static EMPLOYEE_RE: OnceLock<Regex> = OnceLock::new();
    let re = EMPLOYEE_RE
        .get_or_init(|| Regex::new(r"(\d{2,5})\s+employees").expect("valid regex"));
    if let Some(caps) = re.captures(&content_lower) {
        info.employee_count = caps[1].parse().ok();
    }

    info
}

/// Resolve a Workday sub-domain ticker to a real company name, or accept a
/// long alphabetic sub-domain as the name itself.
pub fn company_from_workday_url(base_url: &str) -> Option<String> {
    if !base_url.contains("myworkdayjobs.com") {
        return None;
    }
    let subdomain = workday_subdomain(base_url)?;
    let lower = subdomain.to_lowercase();

    if let Some(name) = workday_company_map().get(lower.as_str()) {
        return Some(name.to_string());
    }
    if subdomain.len() > 4 && subdomain.chars().all(|c| c.is_ascii_alphabetic()) {
        let mut chars = subdomain.chars();
        let first = chars.next()?;
        return Some(first.to_uppercase().collect::<String>() + chars.as_str());
    }
    None
}

fn clamp_boundary(s: &str, mut index: usize) -> usize {
    index = index.min(s.len());
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn workday_subdomain(base_url: &str) -> Option<String> {
    let host = jobsignal_common::extract_domain(base_url);
    if !host.contains("myworkdayjobs.com") {
        return None;
    }
    let first = host.split('.').next()?;
    (!first.is_empty()).then(|| first.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workday_ticker_resolution() {
        assert_eq!(
            company_from_workday_url("https://mdlz.wd3.myworkdayjobs.com"),
            Some("Mondelez International".to_string())
        );
        assert_eq!(
            company_from_workday_url("https://nvidia.wd5.myworkdayjobs.com"),
            Some("NVIDIA".to_string())
        );
        // Long alphabetic sub-domains are accepted as names.
        assert_eq!(
            company_from_workday_url("https://cloudflare.wd5.myworkdayjobs.com"),
            Some("Cloudflare".to_string())
        );
        // Short unknown tickers are left alone.
        assert_eq!(
            company_from_workday_url("https://xyz1.wd5.myworkdayjobs.com"),
            None
        );
        assert_eq!(company_from_workday_url("https://acme.com"), None);
    }

    #[test]
    fn query_order_prefers_workday_subdomain() {
        let ctx = SourceContext {
            aggregator_domain: None,
            base_url: Some("https://mdlz.wd3.myworkdayjobs.com".to_string()),
        };
        let queries = build_search_queries("Mondelez", Some(&ctx));
        assert!(queries[0].starts_with("mdlz "), "{queries:?}");
        assert!(queries[1].contains("\"Mondelez\""));
    }

    #[test]
    fn aggregator_hint_adds_tech_query() {
        let ctx = SourceContext {
            aggregator_domain: Some("greenhouse.io".to_string()),
            base_url: None,
        };
        let queries = build_search_queries("Acme", Some(&ctx));
        assert!(queries.iter().any(|q| q.contains("tech startup")));
    }

    #[test]
    fn quality_gate_needs_two_signals() {
        let results = vec![SearchResult {
            url: "https://acme.com".to_string(),
            title: "Acme - About the company".to_string(),
            snippet: "Acme builds rockets. Headquarters: Portland.".to_string(),
        }];
        assert!(has_quality_results(&results, "Acme"));
        assert!(!has_quality_results(&[], "Acme"));

        let irrelevant = vec![SearchResult {
            url: "https://other.com".to_string(),
            title: "Unrelated page".to_string(),
            snippet: "nothing to see".to_string(),
        }];
        assert!(!has_quality_results(&irrelevant, "Acme"));
    }

    #[test]
    fn heuristic_extraction_finds_sections() {
        let content = "Welcome. About us: Acme builds developer tools for 20 years. \
                       Our mission is to simplify infrastructure. We are a fully remote, \
                       distributed team with 250 employees using machine learning.";
        let info = extract_with_heuristics(content);
        assert!(info.about.contains("Acme builds developer tools"));
        assert!(info.mission.contains("simplify infrastructure"));
        assert!(info.is_remote_first);
        assert!(info.ai_ml_focus);
        assert_eq!(info.employee_count, Some(250));
    }

    #[test]
    fn merge_never_downgrades() {
        let mut base = CompanyInfo {
            about: "Existing about".to_string(),
            ..Default::default()
        };
        merge_info(
            &mut base,
            CompanyInfo {
                about: "".to_string(),
                culture: "Great culture".to_string(),
                ..Default::default()
            },
        );
        assert_eq!(base.about, "Existing about");
        assert_eq!(base.culture, "Great culture");
    }
}
