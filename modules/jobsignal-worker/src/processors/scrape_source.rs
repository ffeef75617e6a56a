//! SCRAPE_SOURCE processor: run the generic scraper for one registered
//! source, with FK self-healing, sparse-result config self-healing, and
//! health recording. Items without a source reference rotate over the
//! oldest-scraped ACTIVE sources.

use anyhow::{Context, Result};
use jobsignal_common::{disable_tags, QueueItem, QueueStatus, SourceRecord, SourceStatus};
use jobsignal_scraper::{expand_config, GenericScraper, ScrapeError};
use jobsignal_store::StatusUpdate;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::{attempt_fetch, AnalysisInput, SourceAnalyzer};
use crate::context::ProcessorContext;
use crate::intake::ScraperIntake;

pub async fn process(ctx: &ProcessorContext, item: &QueueItem) -> Result<()> {
    // A scrape item names its source directly, by URL, or not at all.
    // The last case is a rotation request.
    let source = resolve_source(ctx, item).await?;

    let Some(source) = source else {
        if item.state_has("max_sources") || item.url.trim().is_empty() {
            return run_rotation(ctx, item).await;
        }
        ctx.queue
            .update_status(
                item.id,
                QueueStatus::Failed,
                StatusUpdate::message("Source not found")
                    .with_error(format!("source_id={:?}, url={}", item.source_id, item.url)),
            )
            .await?;
        return Ok(());
    };

    if source.status == SourceStatus::Disabled {
        ctx.queue
            .update_status(
                item.id,
                QueueStatus::Failed,
                StatusUpdate::message(format!(
                    "Source is disabled: {}. Enable before scraping.",
                    source.name
                )),
            )
            .await?;
        return Ok(());
    }

    let outcome = scrape_one_source(ctx, item, &source).await?;
    match outcome {
        ScrapeOutcome::Completed { found, submitted } => {
            let message = if found > 0 {
                format!("Scraped {found} jobs, submitted {submitted} to queue")
            } else {
                format!("Scrape completed, no jobs currently listed for {}", source.name)
            };
            ctx.queue
                .update_status(
                    item.id,
                    QueueStatus::Success,
                    StatusUpdate::message(message).with_scraped_data(serde_json::json!({
                        "jobs_found": found,
                        "jobs_submitted": submitted,
                        "source_name": source.name,
                    })),
                )
                .await?;
        }
        ScrapeOutcome::Blocked(reason) => {
            ctx.queue
                .update_status(
                    item.id,
                    QueueStatus::Failed,
                    StatusUpdate::message(format!("Source blocked: {reason}"))
                        .with_error(reason),
                )
                .await?;
        }
        ScrapeOutcome::Failed(error) => {
            ctx.queue
                .update_status(
                    item.id,
                    QueueStatus::Failed,
                    StatusUpdate::message(format!("Scraping failed: {error}"))
                        .with_error(error),
                )
                .await?;
        }
    }
    Ok(())
}

enum ScrapeOutcome {
    Completed { found: usize, submitted: usize },
    Blocked(String),
    Failed(String),
}

async fn resolve_source(
    ctx: &ProcessorContext,
    item: &QueueItem,
) -> Result<Option<SourceRecord>> {
    let source_id = item.source_id.or_else(|| {
        item.scraped_data
            .as_ref()
            .and_then(|d| d.get("source_id"))
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    });

    if let Some(id) = source_id {
        return ctx.sources.get_source_by_id(id).await;
    }
    if !item.url.trim().is_empty() {
        return ctx.sources.get_source_for_url(&item.url).await;
    }
    Ok(None)
}

/// Scrape one source end to end: self-heal links, expand config, scrape,
/// self-heal sparse configs, hand results to intake, record health.
async fn scrape_one_source(
    ctx: &ProcessorContext,
    item: &QueueItem,
    source: &SourceRecord,
) -> Result<ScrapeOutcome> {
    info!(item_id = %item.id, source = %source.name, source_type = %source.source_type, "Scraping source");

    // FK self-heal: fill a NULL company link from the item's knowledge.
    let mut company_id = source.company_id.or(item.company_id);
    if let (Some(item_company), None) = (item.company_id, source.company_id) {
        ctx.sources.update_company_link(source.id, item_company).await?;
        company_id = Some(item_company);
    }

    // Company name feeds the scraper only for company-specific sources.
    let company_name = match (source.aggregator_domain.as_deref(), company_id) {
        (None, Some(company_id)) => ctx
            .companies
            .get_by_id(company_id)
            .await?
            .map(|c| c.name),
        _ => None,
    };

    let expanded = match expand_source_config(source, company_name.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            return Ok(ScrapeOutcome::Failed(format!("Invalid config: {e}")));
        }
    };

    let jobs = match run_scraper(ctx, expanded.clone()).await {
        Ok(jobs) => jobs,
        Err(ScrapeError::Blocked(reason)) => {
            warn!(source = %source.name, reason = %reason, "Source blocked");
            ctx.sources
                .disable_source_with_tags(
                    source.id,
                    &format!("Blocked during scrape: {reason}"),
                    &tags_for_block_reason(&reason),
                )
                .await?;
            return Ok(ScrapeOutcome::Blocked(reason));
        }
        Err(e) => {
            ctx.sources
                .update_scrape_status(source.id, SourceStatus::Failed, Some(&e.to_string()))
                .await?;
            return Ok(ScrapeOutcome::Failed(e.to_string()));
        }
    };

    // Sparse result: re-analyze the source URL to synthesize a better
    // config, re-scrape once, and keep the new config only if it works.
    let mut jobs = jobs;
    if is_sparse(&jobs) {
        if let Some((healed_config, healed_jobs)) =
            self_heal_config(ctx, item, source).await?
        {
            ctx.sources.update_config(source.id, &healed_config).await?;
            jobs = healed_jobs;
            info!(source = %source.name, "Self-healed source config");
        }
    }

    let mut submitted = 0;
    if !is_sparse(&jobs) {
        let intake = ScraperIntake::new(&ctx.queue, &ctx.prefilter);
        let label = format!("{}:{}", source.source_type, source.name);
        let stats = intake
            .submit_jobs(&jobs, &label, company_id, source.is_remote_source())
            .await?;
        submitted = stats.inserted;
    }

    // Zero jobs is still a successful scrape; a company may have nothing
    // open.
    ctx.sources
        .update_scrape_status(source.id, SourceStatus::Active, None)
        .await?;

    Ok(ScrapeOutcome::Completed {
        found: jobs.len(),
        submitted,
    })
}

fn expand_source_config(
    source: &SourceRecord,
    company_name: Option<&str>,
) -> Result<jobsignal_common::SourceConfig, ScrapeError> {
    let kind = if source.config.extra.contains_key("board_token") {
        "greenhouse".to_string()
    } else {
        source.source_type.to_string()
    };
    let mut config = expand_config(&kind, source.config.to_value())?;
    if config.company_name.is_none() {
        config.company_name = company_name.map(str::to_string);
    }
    Ok(config)
}

async fn run_scraper(
    ctx: &ProcessorContext,
    config: jobsignal_common::SourceConfig,
) -> Result<Vec<jobsignal_common::Posting>, ScrapeError> {
    let mut scraper = GenericScraper::new(config, ctx.policies.scraping.clone());
    if let Some(renderer) = &ctx.renderer {
        scraper = scraper.with_renderer(renderer.clone());
    }
    scraper.scrape().await
}

async fn self_heal_config(
    ctx: &ProcessorContext,
    item: &QueueItem,
    source: &SourceRecord,
) -> Result<Option<(jobsignal_common::SourceConfig, Vec<jobsignal_common::Posting>)>> {
    let url = source.config.url.clone();
    info!(source = %source.name, url = %url, "Sparse scrape; re-analyzing source");

    let analyzer = SourceAnalyzer::new(ctx.http.clone(), ctx.agent.clone());
    let fetch = attempt_fetch(&ctx.http, &url).await;
    let analysis = analyzer
        .analyze(&AnalysisInput {
            url,
            company_name: item.company_name.clone(),
            fetch: Some(fetch),
            search_results: Vec::new(),
        })
        .await?;

    let Some(new_config) = analysis.source_config else {
        return Ok(None);
    };
    if new_config == source.config {
        return Ok(None);
    }

    let healed_jobs = match run_scraper(ctx, new_config.clone()).await {
        Ok(jobs) => jobs,
        Err(_) => return Ok(None),
    };
    if is_sparse(&healed_jobs) {
        return Ok(None);
    }
    Ok(Some((new_config, healed_jobs)))
}

/// Empty result, or a first row missing title/url/description.
fn is_sparse(jobs: &[jobsignal_common::Posting]) -> bool {
    match jobs.first() {
        None => true,
        Some(sample) => sample.is_sparse(),
    }
}

/// Map a block reason onto the health tags recovery understands.
fn tags_for_block_reason(reason: &str) -> Vec<&'static str> {
    let lower = reason.to_lowercase();
    let mut tags = Vec::new();

    if ["captcha", "cloudflare", "robot", "verification", "just a moment"]
        .iter()
        .any(|m| lower.contains(m))
    {
        tags.push(disable_tags::ANTI_BOT);
    }
    if lower.contains("401") || lower.contains("unauthorized") || lower.contains("auth") {
        tags.push(disable_tags::AUTH_REQUIRED);
    }
    if lower.contains("403") || lower.contains("forbidden") {
        tags.push(disable_tags::PROTECTED_API);
    }
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
    {
        tags.push(disable_tags::RATE_LIMITED);
    }
    if lower.contains("dns") {
        tags.push(disable_tags::DNS_ERROR);
    }

    if tags.is_empty() {
        tags.push(disable_tags::ANTI_BOT);
    }
    tags
}

// --- Rotation (no explicit source) ---

/// Scrape the `max_sources` oldest-scraped ACTIVE sources, stopping early
/// once `target_matches` postings have been accepted into the queue.
async fn run_rotation(ctx: &ProcessorContext, item: &QueueItem) -> Result<()> {
    let max_sources = item
        .state_get("max_sources")
        .and_then(|v| v.as_u64())
        .unwrap_or(5) as usize;
    let target_matches = item
        .state_get("target_matches")
        .and_then(|v| v.as_u64())
        .unwrap_or(u64::MAX) as usize;

    let sources = ctx.sources.get_active_sources(None, &[]).await?;
    let rotation: Vec<SourceRecord> = sources.into_iter().take(max_sources).collect();

    info!(
        item_id = %item.id,
        sources = rotation.len(),
        max_sources,
        "Running scrape rotation"
    );

    let mut scraped = 0usize;
    let mut total_found = 0usize;
    let mut total_submitted = 0usize;
    let mut failures = 0usize;

    for source in &rotation {
        let outcome = scrape_one_source(ctx, item, source)
            .await
            .context("rotation scrape failed")?;
        scraped += 1;
        match outcome {
            ScrapeOutcome::Completed { found, submitted } => {
                total_found += found;
                total_submitted += submitted;
            }
            ScrapeOutcome::Blocked(_) | ScrapeOutcome::Failed(_) => failures += 1,
        }
        if total_submitted >= target_matches {
            info!(item_id = %item.id, total_submitted, "Rotation target reached early");
            break;
        }
    }

    ctx.queue
        .update_status(
            item.id,
            QueueStatus::Success,
            StatusUpdate::message(format!(
                "Rotation scraped {scraped} sources: {total_found} jobs found, \
                 {total_submitted} submitted, {failures} failures"
            ))
            .with_scraped_data(serde_json::json!({
                "sources_scraped": scraped,
                "jobs_found": total_found,
                "jobs_submitted": total_submitted,
                "failures": failures,
            })),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_reason_tag_mapping() {
        assert_eq!(
            tags_for_block_reason("Cloudflare waiting page detected"),
            vec![disable_tags::ANTI_BOT]
        );
        assert_eq!(
            tags_for_block_reason("HTTP 403: Forbidden"),
            vec![disable_tags::PROTECTED_API]
        );
        assert_eq!(
            tags_for_block_reason("HTTP 401: Unauthorized"),
            vec![disable_tags::AUTH_REQUIRED]
        );
        assert_eq!(
            tags_for_block_reason("HTTP 429: Too Many Requests"),
            vec![disable_tags::RATE_LIMITED]
        );
        assert!(tags_for_block_reason("dns lookup failed")
            .contains(&disable_tags::DNS_ERROR));
        assert_eq!(
            tags_for_block_reason("mystery block"),
            vec![disable_tags::ANTI_BOT],
            "unknown reasons still get a non-recoverable tag"
        );
    }

    #[test]
    fn sparse_detection() {
        assert!(is_sparse(&[]));
        let mut posting = jobsignal_common::Posting::new("T", "https://x.test");
        assert!(is_sparse(&[posting.clone()]), "no description");
        posting.description = "Full description".to_string();
        assert!(!is_sparse(&[posting]));
    }
}
