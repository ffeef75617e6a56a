//! The JOB decision-tree pipeline.
//!
//! One stage per dequeue, driven purely by what `pipeline_state` already
//! holds: no job_data means scrape, no filter_result means filter, no
//! match_result means analyze, otherwise save. The same item id advances
//! through stages via requeue-with-state.

use std::time::Instant;

use anyhow::{Context, Result};
use jobsignal_common::{Posting, QueueItem, QueueStatus};
use jobsignal_scraper::{boards, expand_config, GenericScraper, ScrapeError};
use jobsignal_store::StatusUpdate;
use tracing::info;

use crate::context::ProcessorContext;
use crate::extract::extract_job_facts;

pub async fn process(ctx: &ProcessorContext, item: &QueueItem) -> Result<()> {
    let has_job_data = item.state_has("job_data");
    let has_filter_result = item.state_has("filter_result");
    let has_match_result = item.state_has("match_result");

    if !has_job_data {
        do_scrape(ctx, item).await
    } else if !has_filter_result {
        do_filter(ctx, item).await
    } else if !has_match_result {
        do_analyze(ctx, item).await
    } else {
        do_save(ctx, item).await
    }
}

fn state_object(item: &QueueItem) -> serde_json::Map<String, serde_json::Value> {
    item.pipeline_state.as_object().cloned().unwrap_or_default()
}

fn posting_from_state(item: &QueueItem) -> Result<Posting> {
    let job_data = item
        .state_get("job_data")
        .context("pipeline_state missing job_data")?;
    serde_json::from_value(job_data.clone()).context("job_data does not deserialize")
}

async fn do_scrape(ctx: &ProcessorContext, item: &QueueItem) -> Result<()> {
    let start = Instant::now();
    info!(item_id = %item.id, stage = "scrape", status = "started", url = %item.url);

    let source = ctx.sources.get_source_for_url(&item.url).await?;
    let scraped = match &source {
        Some(source) => scrape_via_source_config(ctx, item, source).await,
        None => {
            boards::scrape_job_url(&ctx.http, &ctx.policies.scraping, &item.url)
                .await
                .map_err(anyhow::Error::from)
        }
    };

    let posting = match scraped {
        Ok(posting) => posting,
        Err(e) => {
            ctx.queue
                .update_status(
                    item.id,
                    QueueStatus::Failed,
                    StatusUpdate::message("Could not scrape job details from URL")
                        .with_error(format!("Failed to extract data from {}: {e:#}", item.url)),
                )
                .await?;
            info!(
                item_id = %item.id,
                stage = "scrape",
                status = "failed",
                duration_ms = start.elapsed().as_millis() as u64,
            );
            return Ok(());
        }
    };

    let mut state = state_object(item);
    state.insert("job_data".to_string(), serde_json::to_value(&posting)?);
    state.insert(
        "scrape_method".to_string(),
        serde_json::json!(source.as_ref().map(|s| s.name.clone()).unwrap_or_else(|| "generic".to_string())),
    );

    ctx.queue
        .requeue_with_state(item.id, serde_json::Value::Object(state), "filter")
        .await?;

    info!(
        item_id = %item.id,
        stage = "scrape",
        status = "completed",
        title = %posting.title,
        company = %posting.company,
        duration_ms = start.elapsed().as_millis() as u64,
    );
    Ok(())
}

/// Scrape using a registered source's config and pick the posting matching
/// this item's URL; the per-board scraper is the fallback.
async fn scrape_via_source_config(
    ctx: &ProcessorContext,
    item: &QueueItem,
    source: &jobsignal_common::SourceRecord,
) -> Result<Posting> {
    let kind = source_kind(source);
    let config = expand_config(&kind, source.config.to_value())?;
    let mut scraper = GenericScraper::new(config, ctx.policies.scraping.clone());
    if let Some(renderer) = &ctx.renderer {
        scraper = scraper.with_renderer(renderer.clone());
    }

    match scraper.scrape().await {
        Ok(postings) => {
            if let Some(posting) = postings.into_iter().find(|p| p.url == item.url) {
                return Ok(posting);
            }
            // Not on the board any more (or URL shape differs); scrape the
            // page itself.
            Ok(boards::scrape_job_url(&ctx.http, &ctx.policies.scraping, &item.url).await?)
        }
        Err(ScrapeError::Blocked(reason)) => Err(ScrapeError::Blocked(reason).into()),
        Err(_) => {
            Ok(boards::scrape_job_url(&ctx.http, &ctx.policies.scraping, &item.url).await?)
        }
    }
}

fn source_kind(source: &jobsignal_common::SourceRecord) -> String {
    if source.config.extra.contains_key("board_token") {
        "greenhouse".to_string()
    } else {
        source.source_type.to_string()
    }
}

async fn do_filter(ctx: &ProcessorContext, item: &QueueItem) -> Result<()> {
    let start = Instant::now();
    let posting = posting_from_state(item)?;
    info!(item_id = %item.id, stage = "filter", status = "started", title = %posting.title);

    let result = ctx.strike_engine.evaluate(&posting);

    if !result.passed {
        let summary = result.rejection_summary();
        ctx.queue
            .update_status(
                item.id,
                QueueStatus::Filtered,
                StatusUpdate::message(format!("Rejected by filters: {summary}"))
                    .with_scraped_data(serde_json::json!({
                        "job_data": posting,
                        "filter_result": result,
                    }))
                    .with_stage("filter"),
            )
            .await?;
        info!(
            item_id = %item.id,
            stage = "filter",
            status = "rejected",
            reason = %summary,
            duration_ms = start.elapsed().as_millis() as u64,
        );
        return Ok(());
    }

    let mut state = state_object(item);
    state.insert("filter_result".to_string(), serde_json::to_value(&result)?);
    ctx.queue
        .requeue_with_state(item.id, serde_json::Value::Object(state), "analyze")
        .await?;

    info!(
        item_id = %item.id,
        stage = "filter",
        status = "completed",
        strikes = result.total_strikes,
        duration_ms = start.elapsed().as_millis() as u64,
    );
    Ok(())
}

async fn do_analyze(ctx: &ProcessorContext, item: &QueueItem) -> Result<()> {
    let start = Instant::now();
    let posting = posting_from_state(item)?;
    info!(item_id = %item.id, stage = "analyze", status = "started", title = %posting.title);

    // Make sure an enriched company record exists for context; without it
    // the company-signal scoring category has nothing to read.
    let company_name = if !posting.company.is_empty() {
        Some(posting.company.clone())
    } else {
        item.company_name.clone()
    };
    let company = match &company_name {
        Some(name) => ensure_company(ctx, item, name, &posting).await?,
        None => None,
    };

    let extraction = extract_job_facts(
        &posting,
        &ctx.policies.prefilter.work_arrangement.remote_keywords,
        ctx.agent.as_ref(),
    )
    .await;

    let breakdown = ctx
        .scoring
        .score(&extraction, &posting.description, company.as_ref());

    if !breakdown.passed {
        let reason = breakdown
            .rejection_reason
            .clone()
            .unwrap_or_else(|| "Below match threshold".to_string());
        ctx.queue
            .update_status(
                item.id,
                QueueStatus::Skipped,
                StatusUpdate::message(format!("Not a match: {reason}"))
                    .with_scraped_data(serde_json::json!({ "score_breakdown": breakdown }))
                    .with_stage("analyze"),
            )
            .await?;
        info!(
            item_id = %item.id,
            stage = "analyze",
            status = "skipped",
            score = breakdown.final_score,
            duration_ms = start.elapsed().as_millis() as u64,
        );
        return Ok(());
    }

    let mut state = state_object(item);
    state.insert(
        "match_result".to_string(),
        serde_json::json!({
            "score": breakdown.final_score,
            "breakdown": breakdown,
            "extraction": extraction,
            "company_id": company.map(|c| c.id),
        }),
    );
    ctx.queue
        .requeue_with_state(item.id, serde_json::Value::Object(state), "save")
        .await?;

    info!(
        item_id = %item.id,
        stage = "analyze",
        status = "completed",
        score = breakdown.final_score,
        duration_ms = start.elapsed().as_millis() as u64,
    );
    Ok(())
}

/// Read-through company lookup for the ANALYZE stage: an already-enriched
/// record is used as-is, otherwise the company info fetcher populates one.
/// A bare stub is the fallback when there is not enough signal to search.
async fn ensure_company(
    ctx: &ProcessorContext,
    item: &QueueItem,
    name: &str,
    posting: &Posting,
) -> Result<Option<jobsignal_common::Company>> {
    if let Some(existing) = ctx.companies.get_by_name(name).await? {
        if existing.data_quality != jobsignal_common::DataQuality::Minimal {
            return Ok(Some(existing));
        }
    }

    // The posting's own URL is a job page; the aggregator-extracted company
    // website is the better hint when present.
    let url_hint = posting
        .company_website
        .as_deref()
        .unwrap_or(item.url.as_str());
    let hint_is_job_board = ctx.sources.is_job_board_url(url_hint).await?;
    let source_context = crate::processors::source_context_for(ctx, item).await;

    let info = ctx
        .company_info
        .fetch_company_info(
            name,
            Some(url_hint),
            source_context.as_ref(),
            |_| hint_is_job_board,
        )
        .await;

    let company_id = if info.is_empty() {
        ctx.companies.create_stub(name).await?
    } else {
        ctx.companies.upsert(&info.to_company_record(name)).await?
    };
    ctx.companies.get_by_id(company_id).await
}

async fn do_save(ctx: &ProcessorContext, item: &QueueItem) -> Result<()> {
    let start = Instant::now();
    let posting = posting_from_state(item)?;
    let match_result = item
        .state_get("match_result")
        .context("pipeline_state missing match_result")?
        .clone();

    let score = match_result["score"].as_i64().unwrap_or(0) as i32;
    let match_id = ctx
        .matches
        .save(
            &item.url,
            &posting.title,
            &posting.company,
            score,
            &match_result["breakdown"],
            Some(item.id),
        )
        .await?;

    ctx.queue
        .update_status(
            item.id,
            QueueStatus::Success,
            StatusUpdate::message(format!("Match saved: {match_id}"))
                .with_scraped_data(serde_json::json!({
                    "match_id": match_id,
                    "match_score": score,
                }))
                .with_stage("save"),
        )
        .await?;

    info!(
        item_id = %item.id,
        stage = "save",
        status = "completed",
        match_id = %match_id,
        score,
        duration_ms = start.elapsed().as_millis() as u64,
    );
    Ok(())
}
