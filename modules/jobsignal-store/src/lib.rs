pub mod companies;
pub mod matches;
pub mod migrate;
pub mod queue;
pub mod sources;

pub use companies::{classify_data_quality, CompanyStore};
pub use matches::{JobMatch, MatchStore};
pub use migrate::migrate;
pub use queue::{QueueManager, StatusUpdate};
pub use sources::{fuzzy_name_match, NewSource, SourceRegistry};
