pub mod blocked;
pub mod boards;
pub mod dates;
pub mod detail;
pub mod error;
pub mod expand;
pub mod generic;
pub mod normalize;
pub mod paths;
pub mod sanitize;

pub use error::{Result, ScrapeError};
pub use expand::{expand_config, normalize_source_type};
pub use generic::GenericScraper;
pub use normalize::{matches_company_filter, normalize_company_name};
