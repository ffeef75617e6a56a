//! Config expansion: turns a minimalist registered config (a Greenhouse
//! board token, a bare RSS URL) into a full [`SourceConfig`] with platform
//! defaults before scraping.

use jobsignal_common::{SourceConfig, SourceType};
use serde_json::{json, Map, Value};

use crate::error::{Result, ScrapeError};

/// Normalize a stored source-type label to a scraper transport.
/// Vendor names (workday, greenhouse, lever, ...) are all API transports;
/// `company-page` is an HTML scrape; anything unknown defaults to api.
pub fn normalize_source_type(raw: &str) -> SourceType {
    match raw.trim().to_lowercase().as_str() {
        "rss" => SourceType::Rss,
        "html" | "company-page" | "company_page" => SourceType::Html,
        _ => SourceType::Api,
    }
}

/// Field map for the Greenhouse boards API (`?content=true`).
pub fn greenhouse_fields() -> Value {
    json!({
        "title": "title",
        "url": "absolute_url",
        "location": "location.name",
        "description": "content",
        "posted_date": "updated_at",
        "departments": "departments",
        "offices": "offices",
        "metadata": "metadata",
    })
}

/// Default field map for RSS feeds.
fn rss_fields() -> Value {
    json!({
        "title": "title",
        "url": "link",
        "description": "description",
        "posted_date": "published",
        "tags": "categories",
    })
}

/// Expand a registered config document into a full, validated source config.
///
/// `source_kind` is the stored source-type label (vendor name or transport).
/// Legacy key names (`base_url`/`api_endpoint` for `url`, `*_field` for
/// `fields.*`) are normalized along the way.
pub fn expand_config(source_kind: &str, config: Value) -> Result<SourceConfig> {
    let mut obj = match config {
        Value::Object(map) => map,
        other => {
            return Err(ScrapeError::InvalidConfig(format!(
                "config must be an object, got {other}"
            )))
        }
    };

    let transport = normalize_source_type(
        obj.get("type")
            .and_then(|v| v.as_str())
            .unwrap_or(source_kind),
    );

    // Legacy url aliases.
    if !obj.contains_key("url") {
        for alias in ["api_endpoint", "base_url"] {
            if let Some(url) = obj.remove(alias) {
                obj.insert("url".to_string(), url);
                break;
            }
        }
    }

    // Legacy per-field aliases.
    promote_legacy_fields(&mut obj);

    let kind = source_kind.trim().to_lowercase();
    match (kind.as_str(), transport) {
        ("greenhouse", _) => expand_greenhouse(obj),
        ("rss", _) | (_, SourceType::Rss) => expand_rss(obj),
        (_, SourceType::Html) => expand_with_type(obj, SourceType::Html),
        (_, SourceType::Api) => expand_api(obj),
    }
}

fn promote_legacy_fields(obj: &mut Map<String, Value>) {
    let mut fields = obj
        .get("fields")
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();

    for (legacy, canonical) in [
        ("title_field", "title"),
        ("link_field", "url"),
        ("description_field", "description"),
        ("date_field", "posted_date"),
    ] {
        if let Some(Value::String(path)) = obj.remove(legacy) {
            fields
                .entry(canonical.to_string())
                .or_insert(Value::String(path));
        }
    }

    if !fields.is_empty() {
        obj.insert("fields".to_string(), Value::Object(fields));
    }
}

fn expand_greenhouse(mut obj: Map<String, Value>) -> Result<SourceConfig> {
    let has_full_config = obj.contains_key("url") && obj.contains_key("fields");

    if !has_full_config {
        let token = obj
            .remove("board_token")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| {
                ScrapeError::InvalidConfig(
                    "greenhouse config requires board_token or a full url+fields config"
                        .to_string(),
                )
            })?;

        obj.insert(
            "url".to_string(),
            json!(format!(
                "https://boards-api.greenhouse.io/v1/boards/{token}/jobs?content=true"
            )),
        );
        obj.insert("response_path".to_string(), json!("jobs"));
        obj.insert("fields".to_string(), greenhouse_fields());
    } else {
        obj.remove("board_token");
    }

    expand_with_type(obj, SourceType::Api)
}

fn expand_rss(mut obj: Map<String, Value>) -> Result<SourceConfig> {
    if !obj.contains_key("url") {
        return Err(ScrapeError::InvalidConfig(
            "rss config requires url".to_string(),
        ));
    }
    if !obj.contains_key("fields") {
        obj.insert("fields".to_string(), rss_fields());
    }
    expand_with_type(obj, SourceType::Rss)
}

fn expand_api(mut obj: Map<String, Value>) -> Result<SourceConfig> {
    if !obj.contains_key("url") {
        return Err(ScrapeError::InvalidConfig(
            "api config requires url".to_string(),
        ));
    }
    if !obj.contains_key("fields") {
        obj.insert("fields".to_string(), json!({"title": "title", "url": "url"}));
    }
    expand_with_type(obj, SourceType::Api)
}

fn expand_with_type(mut obj: Map<String, Value>, transport: SourceType) -> Result<SourceConfig> {
    obj.insert("type".to_string(), json!(transport.to_string()));
    SourceConfig::from_value(Value::Object(obj))
        .map_err(|e| ScrapeError::InvalidConfig(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_token_expands_to_full_greenhouse_config() {
        let config = expand_config("greenhouse", json!({"board_token": "cloudflare"})).unwrap();
        assert_eq!(config.source_type, SourceType::Api);
        assert!(config.url.contains("boards-api.greenhouse.io"));
        assert!(config.url.contains("cloudflare"));
        assert_eq!(config.response_path.as_deref(), Some("jobs"));
        assert_eq!(
            config.fields.get("url").map(String::as_str),
            Some("absolute_url")
        );
        assert!(!config.extra.contains_key("board_token"));
    }

    #[test]
    fn full_greenhouse_config_preserved() {
        let config = expand_config(
            "greenhouse",
            json!({
                "url": "https://boards-api.greenhouse.io/v1/boards/custom/jobs",
                "response_path": "jobs",
                "fields": {"title": "custom_title", "url": "custom_url"},
            }),
        )
        .unwrap();
        assert_eq!(config.url, "https://boards-api.greenhouse.io/v1/boards/custom/jobs");
        assert_eq!(
            config.fields.get("title").map(String::as_str),
            Some("custom_title")
        );
    }

    #[test]
    fn greenhouse_without_token_or_config_fails() {
        let err = expand_config("greenhouse", json!({})).unwrap_err();
        assert!(err.to_string().contains("board_token"));
    }

    #[test]
    fn rss_gets_default_fields_and_legacy_names() {
        let config = expand_config(
            "rss",
            json!({
                "url": "https://example.com/jobs.rss",
                "title_field": "custom_title",
                "link_field": "custom_link",
                "description_field": "custom_desc",
            }),
        )
        .unwrap();
        assert_eq!(config.source_type, SourceType::Rss);
        assert_eq!(config.fields.get("title").map(String::as_str), Some("custom_title"));
        assert_eq!(config.fields.get("url").map(String::as_str), Some("custom_link"));
        assert_eq!(
            config.fields.get("description").map(String::as_str),
            Some("custom_desc")
        );
    }

    #[test]
    fn rss_requires_url() {
        assert!(expand_config("rss", json!({})).is_err());
    }

    #[test]
    fn api_legacy_base_url_promoted() {
        let config = expand_config(
            "api",
            json!({"base_url": "https://api.example.com/jobs", "response_path": "jobs"}),
        )
        .unwrap();
        assert_eq!(config.url, "https://api.example.com/jobs");
        assert_eq!(config.source_type, SourceType::Api);
    }

    #[test]
    fn company_page_html_preserved_with_js_settings() {
        let config = expand_config(
            "company-page",
            json!({
                "type": "html",
                "url": "https://example.com/careers",
                "job_selector": ".job-listing",
                "fields": {"title": ".title", "url": "a@href"},
                "requires_js": true,
                "render_wait_for": ".jobs-container",
                "render_timeout_ms": 25000,
            }),
        )
        .unwrap();
        assert_eq!(config.source_type, SourceType::Html);
        assert!(config.requires_js);
        assert_eq!(config.render_wait_for.as_deref(), Some(".jobs-container"));
        assert_eq!(config.render_timeout_ms, Some(25000));
    }

    #[test]
    fn vendor_types_normalize_to_api() {
        for vendor in ["workday", "icims", "rippling", "ashby", "lever", "smartrecruiters", "json"] {
            assert_eq!(normalize_source_type(vendor), SourceType::Api, "{vendor}");
        }
        assert_eq!(normalize_source_type("company-page"), SourceType::Html);
        assert_eq!(normalize_source_type("  API  "), SourceType::Api);
        assert_eq!(normalize_source_type("totally_unknown"), SourceType::Api);
    }

    #[test]
    fn unknown_kind_defaults_to_api() {
        let config = expand_config("custom_type", json!({"url": "https://example.com/jobs"})).unwrap();
        assert_eq!(config.source_type, SourceType::Api);
    }

    #[test]
    fn workday_full_config_normalized() {
        let config = expand_config(
            "workday",
            json!({
                "type": "workday",
                "url": "https://co.wd5.myworkdayjobs.com/wday/cxs/co/board/jobs",
                "fields": {"title": "title", "url": "externalPath"},
                "method": "POST",
                "post_body": {"limit": 50, "offset": 0},
            }),
        )
        .unwrap();
        assert_eq!(config.source_type, SourceType::Api);
        assert_eq!(config.method.as_deref(), Some("POST"));
    }
}
