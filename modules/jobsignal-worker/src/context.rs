//! Explicit context passed to every processor. Built once per process at
//! startup; no global state.

use std::sync::Arc;
use std::time::Duration;

use ai_client::LlmAgent;
use browserless_client::BrowserlessClient;
use jobsignal_common::Policies;
use jobsignal_filters::{PreFilter, ScoringEngine, StrikeEngine};
use jobsignal_store::{CompanyStore, MatchStore, QueueManager, SourceRegistry};

use crate::company_info::CompanyInfoFetcher;
use crate::search::WebSearcher;

pub struct ProcessorContext {
    pub queue: QueueManager,
    pub sources: Arc<SourceRegistry>,
    pub companies: CompanyStore,
    pub matches: MatchStore,
    pub policies: Policies,
    pub prefilter: PreFilter,
    pub strike_engine: StrikeEngine,
    pub scoring: ScoringEngine,
    pub company_info: CompanyInfoFetcher,
    pub http: reqwest::Client,
    pub renderer: Option<Arc<BrowserlessClient>>,
    pub search: Option<Arc<dyn WebSearcher>>,
    pub agent: Option<Arc<dyn LlmAgent>>,
}

impl ProcessorContext {
    pub fn new(
        queue: QueueManager,
        sources: Arc<SourceRegistry>,
        companies: CompanyStore,
        matches: MatchStore,
        policies: Policies,
        renderer: Option<Arc<BrowserlessClient>>,
        search: Option<Arc<dyn WebSearcher>>,
        agent: Option<Arc<dyn LlmAgent>>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(policies.scraping.list_timeout_secs))
            .user_agent(policies.scraping.user_agent.clone())
            .build()
            .expect("Failed to build HTTP client");
        let company_info =
            CompanyInfoFetcher::new(http.clone(), search.clone(), agent.clone());

        Self {
            queue,
            sources,
            companies,
            matches,
            prefilter: PreFilter::new(policies.prefilter.clone()),
            strike_engine: StrikeEngine::new(policies.matching.clone()),
            scoring: ScoringEngine::new(policies.matching.clone()),
            company_info,
            policies,
            http,
            renderer,
            search,
            agent,
        }
    }
}
