use std::env;

/// Infrastructure configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // AI provider (optional; deterministic paths run without it)
    pub anthropic_api_key: String,

    // Search (optional)
    pub serper_api_key: String,

    // Headless renderer (optional)
    pub browserless_url: String,
    pub browserless_token: String,

    // Worker pool
    pub worker_count: usize,
    /// Items stuck in PROCESSING longer than this are reclaimed.
    pub lease_timeout_secs: u64,
    /// Seconds between recovery sweeps.
    pub recovery_interval_secs: u64,

    /// Directory holding the policy documents (JSON files).
    pub policy_dir: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            serper_api_key: env::var("SERPER_API_KEY").unwrap_or_default(),
            browserless_url: env::var("BROWSERLESS_URL").unwrap_or_default(),
            browserless_token: env::var("BROWSERLESS_TOKEN").unwrap_or_default(),
            worker_count: env::var("WORKER_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            lease_timeout_secs: env::var("LEASE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(600),
            recovery_interval_secs: env::var("RECOVERY_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            policy_dir: env::var("POLICY_DIR").unwrap_or_else(|_| "config".to_string()),
        }
    }

    /// Log the loaded config without secrets.
    pub fn log_redacted(&self) {
        tracing::info!(
            workers = self.worker_count,
            lease_timeout_secs = self.lease_timeout_secs,
            has_llm = !self.anthropic_api_key.is_empty(),
            has_search = !self.serper_api_key.is_empty(),
            has_renderer = !self.browserless_url.is_empty(),
            policy_dir = %self.policy_dir,
            "Config loaded"
        );
    }
}

fn required_env(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| panic!("{name} environment variable must be set"))
}
