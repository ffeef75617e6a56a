use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JobSignalError;
use crate::types::SourceType;

/// How to authenticate requests against a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Bearer,
    Header,
    Query,
}

/// Where the scraper recovers a company name from when the feed omits one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyExtraction {
    FromTitle,
    FromDescription,
    None,
}

/// The declarative recipe that drives the generic scraper for one endpoint.
///
/// Serialization is symmetric: `from_value` accepts a superset (legacy field
/// names are normalized), `to_value` omits empty optional fields, so
/// `to_value ∘ from_value ∘ to_value` is a fixed point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_body: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_path: Option<String>,
    /// Canonical posting key -> field path in the source payload.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_min_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_max_field: Option<String>,
    /// Overrides any extracted company name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    /// Narrows an aggregator source to one company's postings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_filter_param: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_extraction: Option<CompanyExtraction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<AuthType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_param: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_js: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_wait_for: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub follow_detail: bool,

    // Health bookkeeping, written by the source registry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_at: Option<DateTime<Utc>>,

    /// Forward-compat scratch for keys this version doesn't model.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl SourceConfig {
    pub fn new(source_type: SourceType, url: impl Into<String>) -> Self {
        Self {
            source_type,
            url: url.into(),
            method: None,
            post_body: None,
            headers: BTreeMap::new(),
            response_path: None,
            fields: BTreeMap::new(),
            job_selector: None,
            base_url: None,
            pagination_type: None,
            page_size: None,
            max_pages: None,
            salary_min_field: None,
            salary_max_field: None,
            company_name: None,
            company_filter: None,
            company_filter_param: None,
            company_extraction: None,
            auth_type: None,
            auth_param: None,
            api_key: None,
            requires_js: false,
            render_wait_for: None,
            render_timeout_ms: None,
            follow_detail: false,
            disabled_notes: Vec::new(),
            disabled_tags: Vec::new(),
            disabled_at: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: &str, path: &str) -> Self {
        self.fields.insert(key.to_string(), path.to_string());
        self
    }

    /// Parse a config document, accepting legacy key names:
    /// `api_endpoint` -> `url`, `title_field` -> `fields.title`,
    /// `link_field` -> `fields.url`.
    pub fn from_value(value: serde_json::Value) -> Result<Self, JobSignalError> {
        let mut obj = match value {
            serde_json::Value::Object(m) => m,
            other => {
                return Err(JobSignalError::InvalidConfig(format!(
                    "source config must be an object, got {other}"
                )))
            }
        };

        if !obj.contains_key("url") {
            if let Some(endpoint) = obj.remove("api_endpoint") {
                obj.insert("url".to_string(), endpoint);
            }
        }

        let mut fields = obj
            .remove("fields")
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        if let Some(serde_json::Value::String(title)) = obj.remove("title_field") {
            fields
                .entry("title".to_string())
                .or_insert(serde_json::Value::String(title));
        }
        if let Some(serde_json::Value::String(link)) = obj.remove("link_field") {
            fields
                .entry("url".to_string())
                .or_insert(serde_json::Value::String(link));
        }
        if !fields.is_empty() {
            obj.insert("fields".to_string(), serde_json::Value::Object(fields));
        }

        serde_json::from_value(serde_json::Value::Object(obj))
            .map_err(|e| JobSignalError::InvalidConfig(e.to_string()))
    }

    /// Serialize, omitting empty optional fields.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("source config serializes")
    }

    /// Structural validation. Rejects configs the scraper cannot execute.
    pub fn validate(&self) -> Result<(), JobSignalError> {
        if self.url.trim().is_empty() {
            return Err(JobSignalError::InvalidConfig("url is empty".to_string()));
        }
        if !self.fields.contains_key("title") && !self.fields.contains_key("url") {
            return Err(JobSignalError::InvalidConfig(
                "fields must map at least one of title or url".to_string(),
            ));
        }
        if self.source_type == SourceType::Html && self.job_selector.is_none() {
            return Err(JobSignalError::InvalidConfig(
                "html source requires job_selector".to_string(),
            ));
        }
        if self.requires_js && self.source_type != SourceType::Html {
            return Err(JobSignalError::InvalidConfig(format!(
                "requires_js is only valid for html sources, not {}",
                self.source_type
            )));
        }
        if let Some(timeout) = self.render_timeout_ms {
            if timeout < 1000 {
                return Err(JobSignalError::InvalidConfig(format!(
                    "render_timeout_ms must be at least 1000, got {timeout}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_api() -> SourceConfig {
        SourceConfig::new(SourceType::Api, "https://api.example.com/jobs")
            .with_field("title", "name")
            .with_field("url", "link")
    }

    #[test]
    fn validate_accepts_minimal_api_config() {
        assert!(minimal_api().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_url() {
        let mut config = minimal_api();
        config.url = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_title_and_url_fields() {
        let config = SourceConfig::new(SourceType::Api, "https://api.example.com/jobs")
            .with_field("location", "loc");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_html_without_job_selector() {
        let config = SourceConfig::new(SourceType::Html, "https://example.com/careers")
            .with_field("title", ".title");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_requires_js_on_non_html() {
        let mut config = minimal_api();
        config.requires_js = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_sub_second_render_timeout() {
        let mut config = SourceConfig::new(SourceType::Html, "https://example.com/careers")
            .with_field("title", ".title");
        config.job_selector = Some(".job".to_string());
        config.render_timeout_ms = Some(500);
        assert!(config.validate().is_err());
        config.render_timeout_ms = Some(1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn from_value_normalizes_legacy_keys() {
        let config = SourceConfig::from_value(json!({
            "type": "api",
            "api_endpoint": "https://api.example.com/jobs",
            "title_field": "name",
            "link_field": "permalink",
        }))
        .unwrap();
        assert_eq!(config.url, "https://api.example.com/jobs");
        assert_eq!(config.fields.get("title").map(String::as_str), Some("name"));
        assert_eq!(config.fields.get("url").map(String::as_str), Some("permalink"));
    }

    #[test]
    fn explicit_fields_win_over_legacy_aliases() {
        let config = SourceConfig::from_value(json!({
            "type": "api",
            "url": "https://api.example.com/jobs",
            "fields": {"title": "title"},
            "title_field": "legacy_title",
        }))
        .unwrap();
        assert_eq!(config.fields.get("title").map(String::as_str), Some("title"));
    }

    #[test]
    fn to_value_omits_empty_optionals() {
        let value = minimal_api().to_value();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("post_body"));
        assert!(!obj.contains_key("headers"));
        assert!(!obj.contains_key("requires_js"));
        assert!(!obj.contains_key("disabled_tags"));
        assert_eq!(obj.get("type").and_then(|v| v.as_str()), Some("api"));
    }

    #[test]
    fn roundtrip_is_fixed_point() {
        let mut config = minimal_api();
        config.company_filter = Some("Acme".to_string());
        config.auth_type = Some(AuthType::Bearer);
        config.api_key = Some("secret".to_string());
        config
            .extra
            .insert("custom_knob".to_string(), json!({"depth": 3}));

        let once = config.to_value();
        let reparsed = SourceConfig::from_value(once.clone()).unwrap();
        let twice = reparsed.to_value();
        assert_eq!(once, twice);
        assert_eq!(reparsed, config);
    }

    #[test]
    fn unknown_keys_survive_roundtrip_via_extra() {
        let config = SourceConfig::from_value(json!({
            "type": "rss",
            "url": "https://example.com/feed",
            "fields": {"title": "title", "url": "link"},
            "board_token": "cloudflare",
        }))
        .unwrap();
        assert_eq!(
            config.extra.get("board_token"),
            Some(&json!("cloudflare"))
        );
        let out = config.to_value();
        assert_eq!(out.get("board_token"), Some(&json!("cloudflare")));
    }
}
