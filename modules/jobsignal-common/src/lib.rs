pub mod config;
pub mod error;
pub mod policy;
pub mod source_config;
pub mod types;

pub use config::Config;
pub use error::JobSignalError;
pub use policy::{MatchPolicy, Policies, PrefilterPolicy, ScrapingSettings};
pub use source_config::{AuthType, CompanyExtraction, SourceConfig};
pub use types::{
    disable_tags, domain_matches, extract_domain, is_search_engine_url, Company, CompanyTier,
    DataQuality, NewQueueItem, Posting, QueueItem, QueueItemType, QueueStatus, SearchResult,
    SourceRecord, SourceStatus, SourceType, DEFAULT_MAX_SPAWN_DEPTH,
};
