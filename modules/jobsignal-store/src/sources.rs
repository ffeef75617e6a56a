//! Source registry: persistent store of scrape sources with status health,
//! aggregator-domain lookup, and company<->source FK self-healing.

use anyhow::Result;
use chrono::{DateTime, Utc};
use jobsignal_common::{JobSignalError, SourceConfig, SourceRecord, SourceStatus, SourceType};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

const SOURCE_COLUMNS: &str = "id, name, source_type, status, config, tags, company_id, \
     aggregator_domain, last_scraped_at, last_error, created_at, updated_at";

pub struct NewSource {
    pub name: String,
    pub source_type: SourceType,
    pub config: SourceConfig,
    pub company_id: Option<Uuid>,
    pub aggregator_domain: Option<String>,
    pub tags: Vec<String>,
    pub status: SourceStatus,
}

pub struct SourceRegistry {
    pool: PgPool,
    /// Distinct aggregator domains, cached per process and invalidated on
    /// any write that can introduce one.
    aggregator_cache: RwLock<Option<Vec<String>>>,
}

impl SourceRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            aggregator_cache: RwLock::new(None),
        }
    }

    /// Register a source. Enforces name uniqueness, the
    /// company-OR-aggregator invariant (a company link strips the
    /// aggregator domain), and `(company_id, aggregator_domain)` pair
    /// uniqueness.
    pub async fn add_source(&self, mut source: NewSource) -> Result<Uuid> {
        if source.company_id.is_some() {
            source.aggregator_domain = None;
        }
        if source.company_id.is_none() && source.aggregator_domain.is_none() {
            return Err(JobSignalError::Validation(
                "source requires a company_id or an aggregator_domain".into(),
            )
            .into());
        }

        if self.get_source_by_name(&source.name).await?.is_some() {
            return Err(JobSignalError::Validation(format!(
                "source name '{}' already exists",
                source.name
            ))
            .into());
        }
        if let Some(existing) = self
            .get_source_by_company_and_aggregator(
                source.company_id,
                source.aggregator_domain.as_deref(),
            )
            .await?
        {
            return Err(JobSignalError::Validation(format!(
                "source for this company/aggregator pair already exists: {}",
                existing.name
            ))
            .into());
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO sources
                (id, name, source_type, status, config, tags, company_id, aggregator_domain)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(&source.name)
        .bind(source.source_type.to_string())
        .bind(source.status.to_string())
        .bind(source.config.to_value())
        .bind(serde_json::to_value(&source.tags)?)
        .bind(source.company_id)
        .bind(&source.aggregator_domain)
        .execute(&self.pool)
        .await?;

        self.invalidate_aggregator_cache().await;
        info!(source_id = %id, name = %source.name, status = %source.status, "Registered source");
        Ok(id)
    }

    pub async fn get_source_by_id(&self, id: Uuid) -> Result<Option<SourceRecord>> {
        let row = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SourceRow::into_record).transpose()
    }

    pub async fn get_source_by_name(&self, name: &str) -> Result<Option<SourceRecord>> {
        let row = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SourceRow::into_record).transpose()
    }

    pub async fn get_source_by_company_and_aggregator(
        &self,
        company_id: Option<Uuid>,
        aggregator_domain: Option<&str>,
    ) -> Result<Option<SourceRecord>> {
        if company_id.is_none() && aggregator_domain.is_none() {
            return Ok(None);
        }
        let row = sqlx::query_as::<_, SourceRow>(&format!(
            r#"
            SELECT {SOURCE_COLUMNS} FROM sources
            WHERE company_id IS NOT DISTINCT FROM $1
              AND aggregator_domain IS NOT DISTINCT FROM $2
              AND status != 'deleted'
            LIMIT 1
            "#
        ))
        .bind(company_id)
        .bind(aggregator_domain)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SourceRow::into_record).transpose()
    }

    /// First source whose configured URL (or the URL itself) appears in the
    /// given job URL. Used to route externally submitted jobs to a
    /// registered source config.
    pub async fn get_source_for_url(&self, url: &str) -> Result<Option<SourceRecord>> {
        let rows = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE status != 'deleted'"
        ))
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let source = row.into_record()?;
            if source_matches_url(&source, url) {
                return Ok(Some(source));
            }
        }
        Ok(None)
    }

    pub async fn get_active_sources(
        &self,
        source_type: Option<SourceType>,
        tags: &[String],
    ) -> Result<Vec<SourceRecord>> {
        let rows = sqlx::query_as::<_, SourceRow>(&format!(
            r#"
            SELECT {SOURCE_COLUMNS} FROM sources
            WHERE status = 'active'
            ORDER BY last_scraped_at ASC NULLS FIRST
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut sources = Vec::new();
        for row in rows {
            let source = row.into_record()?;
            if let Some(wanted) = source_type {
                if source.source_type != wanted {
                    continue;
                }
            }
            if !tags.is_empty() && !tags.iter().all(|t| source.tags.contains(t)) {
                continue;
            }
            sources.push(source);
        }
        Ok(sources)
    }

    /// Recovery candidates: disabled sources carrying none of the excluded
    /// tags, disabled for at least `min_disabled_hours`, oldest first.
    pub async fn get_disabled_sources(
        &self,
        exclude_tags: &[&str],
        min_disabled_hours: i64,
        limit: usize,
    ) -> Result<Vec<SourceRecord>> {
        let rows = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE status = 'disabled'"
        ))
        .fetch_all(&self.pool)
        .await?;

        let cutoff = Utc::now() - chrono::Duration::hours(min_disabled_hours);
        let mut candidates: Vec<SourceRecord> = Vec::new();
        for row in rows {
            let source = row.into_record()?;
            if source
                .config
                .disabled_tags
                .iter()
                .any(|t| exclude_tags.contains(&t.as_str()))
            {
                continue;
            }
            match source.config.disabled_at {
                Some(disabled_at) if disabled_at > cutoff => continue,
                _ => {}
            }
            candidates.push(source);
        }

        candidates.sort_by_key(|s| s.config.disabled_at.unwrap_or(DateTime::<Utc>::MIN_UTC));
        candidates.truncate(limit);
        Ok(candidates)
    }

    /// Record a scrape outcome. Validates the status transition and writes
    /// the health columns.
    pub async fn update_scrape_status(
        &self,
        id: Uuid,
        new_status: SourceStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let source = self
            .get_source_by_id(id)
            .await?
            .ok_or_else(|| JobSignalError::Database(format!("source {id} not found")))?;

        if !SourceStatus::can_transition(source.status, new_status) {
            return Err(JobSignalError::InvalidStateTransition {
                from: source.status.to_string(),
                to: new_status.to_string(),
            }
            .into());
        }

        sqlx::query(
            r#"
            UPDATE sources SET
                status = $2,
                last_scraped_at = now(),
                last_error = $3,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(new_status.to_string())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Disable a source with a timestamped note and additive health tags.
    /// Idempotent: re-disabling merges tags and appends the note. The
    /// read-modify-write of `config` runs in one transaction.
    pub async fn disable_source_with_tags(
        &self,
        id: Uuid,
        reason: &str,
        tags: &[&str],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, (String, serde_json::Value)>(
            "SELECT status, config FROM sources WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((current, raw_config)) = row else {
            return Err(JobSignalError::Database(format!("source {id} not found")).into());
        };

        let status: SourceStatus = current.parse().map_err(JobSignalError::Database)?;
        if !SourceStatus::can_transition(status, SourceStatus::Disabled) {
            return Err(JobSignalError::InvalidStateTransition {
                from: status.to_string(),
                to: SourceStatus::Disabled.to_string(),
            }
            .into());
        }

        let mut config = SourceConfig::from_value(raw_config)?;
        let now = Utc::now();
        config
            .disabled_notes
            .push(format!("[{}] {reason}", now.to_rfc3339()));
        for tag in tags {
            if !config.disabled_tags.iter().any(|t| t == tag) {
                config.disabled_tags.push(tag.to_string());
            }
        }
        config.disabled_at = Some(now);

        sqlx::query(
            r#"
            UPDATE sources SET
                status = 'disabled',
                config = $2,
                last_error = $3,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(config.to_value())
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        warn!(source_id = %id, reason, ?tags, "Disabled source");
        Ok(())
    }

    pub async fn update_config(&self, id: Uuid, config: &SourceConfig) -> Result<()> {
        sqlx::query("UPDATE sources SET config = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(config.to_value())
            .execute(&self.pool)
            .await?;
        self.invalidate_aggregator_cache().await;
        Ok(())
    }

    /// Self-healing FK repair: fill a NULL company link, never overwrite an
    /// existing one. Calling it twice is the same as calling it once.
    pub async fn update_company_link(&self, id: Uuid, company_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sources SET
                company_id = $2,
                aggregator_domain = NULL,
                updated_at = now()
            WHERE id = $1 AND company_id IS NULL
            "#,
        )
        .bind(id)
        .bind(company_id)
        .execute(&self.pool)
        .await?;

        let linked = result.rows_affected() > 0;
        if linked {
            self.invalidate_aggregator_cache().await;
            info!(source_id = %id, company_id = %company_id, "Self-healed company link");
        }
        Ok(linked)
    }

    /// True when the URL belongs to a known aggregator domain.
    pub async fn is_job_board_url(&self, url: &str) -> Result<bool> {
        Ok(self.get_aggregator_domain_for_url(url).await?.is_some())
    }

    /// Match a URL's host against the cached aggregator domains
    /// (sub-domain suffix match).
    pub async fn get_aggregator_domain_for_url(&self, url: &str) -> Result<Option<String>> {
        let domain = jobsignal_common::extract_domain(url);
        if domain.is_empty() {
            return Ok(None);
        }
        let domains = self.aggregator_domains().await?;
        Ok(domains
            .into_iter()
            .find(|candidate| jobsignal_common::domain_matches(&domain, candidate)))
    }

    /// Resolve a company id from source context. Tier 1: direct source
    /// lookup. Tier 2: fuzzy match the raw company name against source
    /// names (normalized, length-aware).
    pub async fn resolve_company_from_source(
        &self,
        source_id: Option<Uuid>,
        company_name_raw: Option<&str>,
    ) -> Result<Option<Uuid>> {
        if let Some(source_id) = source_id {
            if let Some(source) = self.get_source_by_id(source_id).await? {
                if source.company_id.is_some() {
                    return Ok(source.company_id);
                }
            }
        }

        let Some(raw) = company_name_raw.filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE company_id IS NOT NULL"
        ))
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let source = row.into_record()?;
            if fuzzy_name_match(raw, &source.name) {
                return Ok(source.company_id);
            }
        }
        Ok(None)
    }

    async fn aggregator_domains(&self) -> Result<Vec<String>> {
        if let Some(cached) = self.aggregator_cache.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT DISTINCT aggregator_domain FROM sources \
             WHERE aggregator_domain IS NOT NULL AND status != 'deleted'",
        )
        .fetch_all(&self.pool)
        .await?;
        let domains: Vec<String> = rows.into_iter().map(|(domain,)| domain).collect();

        *self.aggregator_cache.write().await = Some(domains.clone());
        Ok(domains)
    }

    async fn invalidate_aggregator_cache(&self) {
        *self.aggregator_cache.write().await = None;
    }
}

/// Does a registered source cover this URL? Exact-prefix match wins;
/// otherwise the registrable domains must agree and, for ATS hosts shared
/// by many tenants, the tenant path segment must reappear in the URL.
fn source_matches_url(source: &SourceRecord, url: &str) -> bool {
    let config_url = source.config.url.to_lowercase();
    let url_lower = url.to_lowercase();
    if config_url.is_empty() {
        return false;
    }
    if url_lower.starts_with(&config_url) {
        return true;
    }

    let config_domain = registrable_domain(&jobsignal_common::extract_domain(&config_url));
    let job_domain = registrable_domain(&jobsignal_common::extract_domain(&url_lower));
    if config_domain.is_empty() || config_domain != job_domain {
        return false;
    }

    match tenant_segment(&config_url) {
        Some(segment) => path_segments(&url_lower).any(|s| s == segment),
        None => true,
    }
}

/// "boards.greenhouse.io" -> "greenhouse.io".
fn registrable_domain(host: &str) -> String {
    let parts: Vec<&str> = host.split('.').filter(|p| !p.is_empty()).collect();
    if parts.len() >= 2 {
        parts[parts.len() - 2..].join(".")
    } else {
        host.to_string()
    }
}

fn path_segments(url: &str) -> impl Iterator<Item = &str> {
    url.split("://")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .skip(1)
        .map(|s| s.split('?').next().unwrap_or(s))
        .filter(|s| !s.is_empty())
}

/// First path segment that looks like a tenant identifier, skipping API
/// plumbing segments.
fn tenant_segment(url: &str) -> Option<String> {
    const PLUMBING: [&str; 6] = ["v1", "v2", "api", "boards", "wday", "cxs"];
    path_segments(url)
        .find(|s| !PLUMBING.contains(s))
        .map(str::to_string)
}

/// Length-aware fuzzy match between a raw company name and a source name.
/// Requires at least 60% overlap of the shorter side and 4+ characters.
pub fn fuzzy_name_match(company_raw: &str, source_name: &str) -> bool {
    let normalize = |s: &str| -> String {
        s.to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    };

    let a = normalize(company_raw);
    let b = normalize(source_name);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }

    let (shorter, longer) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if shorter.len() < 4 {
        return false;
    }
    if longer.contains(shorter.as_str()) {
        let overlap = shorter.len() as f64 / longer.len() as f64;
        return overlap >= 0.6 || longer.starts_with(shorter.as_str());
    }

    // Word-level overlap for multi-word names.
    let a_words: Vec<&str> = a.split(' ').filter(|w| w.len() >= 4).collect();
    if a_words.is_empty() {
        return false;
    }
    let matched = a_words.iter().filter(|w| b.contains(*w)).count();
    matched as f64 / a_words.len() as f64 >= 0.6
}

/// Row shape of `sources`. Type/status are wire strings and config/tags are
/// JSONB; `into_record` builds the domain type.
#[derive(FromRow)]
struct SourceRow {
    id: Uuid,
    name: String,
    source_type: String,
    status: String,
    config: serde_json::Value,
    tags: serde_json::Value,
    company_id: Option<Uuid>,
    aggregator_domain: Option<String>,
    last_scraped_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SourceRow {
    fn into_record(self) -> Result<SourceRecord> {
        let source_type: SourceType =
            self.source_type.parse().map_err(JobSignalError::Database)?;
        let status: SourceStatus = self.status.parse().map_err(JobSignalError::Database)?;
        let config = SourceConfig::from_value(self.config)?;
        let tags: Vec<String> = serde_json::from_value(self.tags)?;

        Ok(SourceRecord {
            id: self.id,
            name: self.name,
            source_type,
            status,
            config,
            tags,
            company_id: self.company_id,
            aggregator_domain: self.aggregator_domain,
            last_scraped_at: self.last_scraped_at,
            last_error: self.last_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsignal_common::SourceConfig;

    fn record(config_url: &str) -> SourceRecord {
        let mut config = SourceConfig::new(SourceType::Api, config_url);
        config.fields.insert("title".into(), "title".into());
        SourceRecord {
            id: Uuid::new_v4(),
            name: "Test Source".to_string(),
            source_type: SourceType::Api,
            status: SourceStatus::Active,
            config,
            tags: vec![],
            company_id: None,
            aggregator_domain: None,
            last_scraped_at: None,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn url_matching_by_prefix() {
        let source = record("https://boards.greenhouse.io/cloudflare");
        assert!(source_matches_url(
            &source,
            "https://boards.greenhouse.io/cloudflare/jobs/7270583"
        ));
    }

    #[test]
    fn url_matching_requires_tenant_segment_on_shared_hosts() {
        let source = record("https://boards-api.greenhouse.io/v1/boards/cloudflare/jobs");
        assert!(source_matches_url(
            &source,
            "https://boards.greenhouse.io/cloudflare/jobs/123"
        ));
        assert!(!source_matches_url(
            &source,
            "https://boards.greenhouse.io/othercorp/jobs/123"
        ));
    }

    #[test]
    fn url_matching_rejects_other_domains() {
        let source = record("https://remotive.com/api/remote-jobs");
        assert!(!source_matches_url(&source, "https://weworkremotely.com/jobs/1"));
    }

    #[test]
    fn fuzzy_match_requires_length_and_overlap() {
        assert!(fuzzy_name_match("Cloudflare", "Cloudflare Careers"));
        assert!(fuzzy_name_match("Acme Labs", "Acme Labs Jobs (Greenhouse)"));
        assert!(!fuzzy_name_match("AI", "RAIL Jobs"), "short names never partial-match");
        assert!(!fuzzy_name_match("Proxify", "Unrelated Corp"));
    }

    #[test]
    fn fuzzy_match_exact_after_normalization() {
        assert!(fuzzy_name_match("Acme, Inc!", "acme inc"));
    }

    #[test]
    fn tenant_segment_skips_api_plumbing() {
        assert_eq!(
            tenant_segment("https://boards-api.greenhouse.io/v1/boards/cloudflare/jobs"),
            Some("cloudflare".to_string())
        );
        assert_eq!(
            tenant_segment("https://boards.greenhouse.io/cloudflare"),
            Some("cloudflare".to_string())
        );
        assert_eq!(tenant_segment("https://remotive.com"), None);
    }
}
