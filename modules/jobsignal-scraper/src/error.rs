use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScrapeError>;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The source actively refused us (4xx, CAPTCHA, anti-bot page).
    /// Callers must disable the source.
    #[error("Scrape blocked: {0}")]
    Blocked(String),

    /// Transient transport failure. Callers record a failure counter.
    #[error("Request error: {0}")]
    Request(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        ScrapeError::Request(err.to_string())
    }
}

impl ScrapeError {
    pub fn is_blocked(&self) -> bool {
        matches!(self, ScrapeError::Blocked(_))
    }
}
