use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Queue Types ---

/// The four kinds of work the queue carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemType {
    Job,
    Company,
    SourceDiscovery,
    ScrapeSource,
}

impl std::fmt::Display for QueueItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueItemType::Job => write!(f, "job"),
            QueueItemType::Company => write!(f, "company"),
            QueueItemType::SourceDiscovery => write!(f, "source_discovery"),
            QueueItemType::ScrapeSource => write!(f, "scrape_source"),
        }
    }
}

impl std::str::FromStr for QueueItemType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "job" => Ok(Self::Job),
            "company" => Ok(Self::Company),
            "source_discovery" => Ok(Self::SourceDiscovery),
            "scrape_source" => Ok(Self::ScrapeSource),
            other => Err(format!("unknown QueueItemType: {other}")),
        }
    }
}

/// Status of a queue item. PENDING and PROCESSING are the only live states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Skipped,
    Filtered,
    NeedsReview,
}

impl QueueStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueStatus::Success
                | QueueStatus::Failed
                | QueueStatus::Skipped
                | QueueStatus::Filtered
                | QueueStatus::NeedsReview
        )
    }

    pub fn is_live(&self) -> bool {
        matches!(self, QueueStatus::Pending | QueueStatus::Processing)
    }

    /// Whether a status change is legal. PROCESSING→PENDING is the requeue
    /// edge and additionally requires a pipeline_stage (enforced by the
    /// queue manager, which owns the write path).
    pub fn can_transition(from: QueueStatus, to: QueueStatus) -> bool {
        use QueueStatus::*;
        matches!(
            (from, to),
            (Pending, Processing)
                | (Processing, Success)
                | (Processing, Failed)
                | (Processing, Skipped)
                | (Processing, Filtered)
                | (Processing, NeedsReview)
                | (Processing, Pending)
        )
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Pending => write!(f, "pending"),
            QueueStatus::Processing => write!(f, "processing"),
            QueueStatus::Success => write!(f, "success"),
            QueueStatus::Failed => write!(f, "failed"),
            QueueStatus::Skipped => write!(f, "skipped"),
            QueueStatus::Filtered => write!(f, "filtered"),
            QueueStatus::NeedsReview => write!(f, "needs_review"),
        }
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            "filtered" => Ok(Self::Filtered),
            "needs_review" => Ok(Self::NeedsReview),
            other => Err(format!("unknown QueueStatus: {other}")),
        }
    }
}

/// Default cap on spawn-tree depth.
pub const DEFAULT_MAX_SPAWN_DEPTH: i32 = 10;

/// A unit of work in the durable queue.
///
/// `pipeline_state` is an opaque JSON scratchpad carried forward between
/// re-dequeues of the same item; `tracking_id` is shared by every item
/// derived from the same user-initiated work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub item_type: QueueItemType,
    pub status: QueueStatus,
    pub url: String,
    pub company_name: Option<String>,
    pub company_id: Option<Uuid>,
    pub source_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub result_message: Option<String>,
    pub error_details: Option<String>,
    pub pipeline_stage: Option<String>,
    #[serde(default)]
    pub pipeline_state: serde_json::Value,
    pub scraped_data: Option<serde_json::Value>,
    pub tracking_id: Uuid,
    #[serde(default)]
    pub ancestry_chain: Vec<Uuid>,
    pub spawn_depth: i32,
    pub max_spawn_depth: i32,
    pub parent_item_id: Option<Uuid>,
    /// Incremented each time a stale PROCESSING lease is reclaimed.
    #[serde(default)]
    pub attempt_count: i32,
}

impl QueueItem {
    /// Read a key from the pipeline_state scratchpad.
    pub fn state_get(&self, key: &str) -> Option<&serde_json::Value> {
        self.pipeline_state.as_object().and_then(|m| m.get(key))
    }

    pub fn state_has(&self, key: &str) -> bool {
        self.state_get(key).is_some()
    }
}

/// Fields a caller provides when enqueueing new work. The queue manager
/// fills in identity, timestamps, tracking and spawn bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct NewQueueItem {
    pub item_type: Option<QueueItemType>,
    pub url: String,
    pub company_name: Option<String>,
    pub company_id: Option<Uuid>,
    pub source_id: Option<Uuid>,
    pub pipeline_stage: Option<String>,
    pub pipeline_state: Option<serde_json::Value>,
    pub scraped_data: Option<serde_json::Value>,
    pub tracking_id: Option<Uuid>,
    pub max_spawn_depth: Option<i32>,
}

impl NewQueueItem {
    pub fn new(item_type: QueueItemType, url: impl Into<String>) -> Self {
        Self {
            item_type: Some(item_type),
            url: url.into(),
            ..Default::default()
        }
    }
}

// --- Source Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Api,
    Rss,
    Html,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Api => write!(f, "api"),
            SourceType::Rss => write!(f, "rss"),
            SourceType::Html => write!(f, "html"),
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "api" => Ok(Self::Api),
            "rss" => Ok(Self::Rss),
            "html" => Ok(Self::Html),
            other => Err(format!("unknown SourceType: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Active,
    Disabled,
    Failed,
    Deleted,
}

impl SourceStatus {
    /// Allowed moves: ACTIVE↔DISABLED, ACTIVE↔FAILED, DISABLED→ACTIVE,
    /// FAILED→ACTIVE. Everything else is an invalid transition. A no-op
    /// (same status) is always allowed so health updates stay idempotent.
    pub fn can_transition(from: SourceStatus, to: SourceStatus) -> bool {
        use SourceStatus::*;
        if from == to {
            return true;
        }
        matches!(
            (from, to),
            (Active, Disabled) | (Active, Failed) | (Disabled, Active) | (Failed, Active)
        )
    }
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceStatus::Active => write!(f, "active"),
            SourceStatus::Disabled => write!(f, "disabled"),
            SourceStatus::Failed => write!(f, "failed"),
            SourceStatus::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for SourceStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "disabled" => Ok(Self::Disabled),
            "failed" => Ok(Self::Failed),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown SourceStatus: {other}")),
        }
    }
}

/// Disable tags recorded on unhealthy sources. The set is open-ended;
/// these are the canonical values the recovery logic knows about.
pub mod disable_tags {
    pub const ANTI_BOT: &str = "anti_bot";
    pub const AUTH_REQUIRED: &str = "auth_required";
    pub const PROTECTED_API: &str = "protected_api";
    pub const DNS_ERROR: &str = "dns_error";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const INVALID_CONFIG: &str = "invalid_config";

    /// Tags that recovery never retries automatically.
    pub const NON_RECOVERABLE: [&str; 3] = [ANTI_BOT, AUTH_REQUIRED, PROTECTED_API];
}

/// A registered scrape endpoint. Exactly one of `company_id` or
/// `aggregator_domain` is set (company-OR-aggregator invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: Uuid,
    pub name: String,
    pub source_type: SourceType,
    pub status: SourceStatus,
    pub config: crate::source_config::SourceConfig,
    pub tags: Vec<String>,
    pub company_id: Option<Uuid>,
    pub aggregator_domain: Option<String>,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SourceRecord {
    /// A source whose tags mark it as remote-only feeds the pre-filter's
    /// `is_remote_source` hint.
    pub fn is_remote_source(&self) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case("remote"))
    }
}

// --- Company Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyTier {
    S,
    A,
    B,
    C,
    D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    Complete,
    Partial,
    #[default]
    Minimal,
}

/// Enriched company record, keyed by name. Lifecycle is independent of
/// sources; the nullable FK from sources points here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub about: Option<String>,
    pub culture: Option<String>,
    pub mission: Option<String>,
    pub headquarters: Option<String>,
    pub employee_count: Option<i32>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub is_remote_first: bool,
    pub industry: Option<String>,
    pub tier: Option<CompanyTier>,
    pub priority_score: Option<f64>,
    #[serde(default)]
    pub data_quality: DataQuality,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Scraped Posting ---

/// A normalized job posting emitted by the generic scraper.
/// Empty defaults are empty strings, never the literal "Unknown".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_max: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub departments: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub offices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_website: Option<String>,
    /// Structured employment type when the board provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employment_type: Option<String>,
    /// Explicit remote flag when the board provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_remote: Option<bool>,
}

impl Posting {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sparse postings (no title, url, or description) trigger source
    /// self-healing.
    pub fn is_sparse(&self) -> bool {
        self.title.trim().is_empty()
            || self.url.trim().is_empty()
            || self.description.trim().is_empty()
    }
}

// --- Search ---

/// A web search result from the optional search client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

// --- URL helpers shared across crates ---

/// Extract the host from a URL (e.g. "https://www.example.com/x" -> "www.example.com").
pub fn extract_domain(url: &str) -> String {
    url.split("://")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or("")
        .split('?')
        .next()
        .unwrap_or("")
        .to_lowercase()
}

/// True when `domain` equals the candidate or is a sub-domain of it
/// ("boards.weworkremotely.com" matches "weworkremotely.com").
pub fn domain_matches(domain: &str, candidate: &str) -> bool {
    let domain = domain.trim_start_matches("www.");
    let candidate = candidate.trim_start_matches("www.");
    domain == candidate || domain.ends_with(&format!(".{candidate}"))
}

/// Search-engine hosts that must never be stored as a company website.
pub fn is_search_engine_url(url: &str) -> bool {
    let domain = extract_domain(url);
    [
        "google.com",
        "bing.com",
        "duckduckgo.com",
        "search.yahoo.com",
        "baidu.com",
    ]
    .iter()
    .any(|d| domain_matches(&domain, d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_status_wire_form_roundtrip() {
        for status in [
            QueueStatus::Pending,
            QueueStatus::Processing,
            QueueStatus::Success,
            QueueStatus::Failed,
            QueueStatus::Skipped,
            QueueStatus::Filtered,
            QueueStatus::NeedsReview,
        ] {
            let s = status.to_string();
            assert_eq!(s.parse::<QueueStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{s}\""));
        }
    }

    #[test]
    fn processing_to_pending_is_the_only_backward_edge() {
        use QueueStatus::*;
        assert!(QueueStatus::can_transition(Processing, Pending));
        assert!(!QueueStatus::can_transition(Success, Pending));
        assert!(!QueueStatus::can_transition(Failed, Pending));
        assert!(!QueueStatus::can_transition(Filtered, Processing));
        assert!(!QueueStatus::can_transition(Pending, Success));
    }

    #[test]
    fn terminal_statuses_are_not_live() {
        for status in [
            QueueStatus::Success,
            QueueStatus::Failed,
            QueueStatus::Skipped,
            QueueStatus::Filtered,
            QueueStatus::NeedsReview,
        ] {
            assert!(status.is_terminal());
            assert!(!status.is_live());
        }
        assert!(QueueStatus::Pending.is_live());
        assert!(QueueStatus::Processing.is_live());
    }

    #[test]
    fn source_status_transition_table() {
        use SourceStatus::*;
        assert!(SourceStatus::can_transition(Active, Disabled));
        assert!(SourceStatus::can_transition(Active, Failed));
        assert!(SourceStatus::can_transition(Disabled, Active));
        assert!(SourceStatus::can_transition(Failed, Active));
        assert!(SourceStatus::can_transition(Disabled, Disabled));
        assert!(!SourceStatus::can_transition(Disabled, Failed));
        assert!(!SourceStatus::can_transition(Deleted, Active));
        assert!(!SourceStatus::can_transition(Failed, Deleted));
    }

    #[test]
    fn queue_item_type_wire_form() {
        assert_eq!(QueueItemType::SourceDiscovery.to_string(), "source_discovery");
        assert_eq!(
            "scrape_source".parse::<QueueItemType>().unwrap(),
            QueueItemType::ScrapeSource
        );
    }

    #[test]
    fn sparse_posting_detection() {
        let mut p = Posting::new("Engineer", "https://example.com/jobs/1");
        assert!(p.is_sparse(), "missing description should be sparse");
        p.description = "Build things".to_string();
        assert!(!p.is_sparse());
        p.title = String::new();
        assert!(p.is_sparse(), "missing title should be sparse");
    }

    #[test]
    fn domain_matching_is_suffix_based() {
        assert!(domain_matches("boards.weworkremotely.com", "weworkremotely.com"));
        assert!(domain_matches("www.remoteok.com", "remoteok.com"));
        assert!(!domain_matches("notweworkremotely.com", "weworkremotely.com"));
    }

    #[test]
    fn search_engines_are_recognized() {
        assert!(is_search_engine_url("https://www.google.com/search?q=acme"));
        assert!(is_search_engine_url("https://duckduckgo.com/?q=acme"));
        assert!(!is_search_engine_url("https://www.acme.com"));
    }
}
