pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Lower bound for render timeouts; anything shorter cannot finish a
/// navigation and indicates a misconfigured source.
pub const MIN_RENDER_TIMEOUT_MS: u64 = 1_000;

/// Outcome of a headless render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderResult {
    pub final_url: String,
    pub status: u16,
    pub html: String,
    pub duration_ms: u64,
    pub request_count: u32,
    pub errors: Vec<String>,
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        let mut endpoint = format!("{}{path}", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }

    /// Render a URL in headless Chrome and return the settled DOM.
    ///
    /// `wait_for` is an optional CSS selector to await before capture;
    /// `timeout_ms` bounds the whole navigation (clamped to at least
    /// [`MIN_RENDER_TIMEOUT_MS`]).
    pub async fn render(
        &self,
        url: &str,
        wait_for: Option<&str>,
        timeout_ms: u64,
    ) -> Result<RenderResult> {
        let timeout_ms = timeout_ms.max(MIN_RENDER_TIMEOUT_MS);
        let started = Instant::now();

        let mut body = serde_json::json!({
            "url": url,
            "gotoOptions": { "timeout": timeout_ms, "waitUntil": "networkidle2" },
        });
        if let Some(selector) = wait_for {
            body["waitForSelector"] = serde_json::json!({
                "selector": selector,
                "timeout": timeout_ms,
            });
        }

        debug!(url, timeout_ms, wait_for = ?wait_for, "Browserless render");

        let resp = self
            .client
            .post(self.endpoint("/content"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let final_url = resp.url().to_string();
        let html = resp.text().await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut errors = Vec::new();
        if html.trim().is_empty() {
            errors.push("empty document after render".to_string());
        }

        Ok(RenderResult {
            final_url,
            status: status.as_u16(),
            html,
            duration_ms,
            request_count: 1,
            errors,
        })
    }
}
