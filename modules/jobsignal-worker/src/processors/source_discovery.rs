//! SOURCE_DISCOVERY processor: classify a URL, register it as a source,
//! and spawn the follow-up work.

use anyhow::{bail, Result};
use jobsignal_common::{
    NewQueueItem, QueueItem, QueueItemType, QueueStatus, SourceConfig, SourceStatus, SourceType,
};
use jobsignal_store::{NewSource, StatusUpdate};
use tracing::info;
use uuid::Uuid;

use crate::analysis::{attempt_fetch, AnalysisInput, Classification, FetchCategory, SourceAnalyzer};
use crate::context::ProcessorContext;

pub async fn process(ctx: &ProcessorContext, item: &QueueItem) -> Result<()> {
    let url = item.url.clone();
    if url.trim().is_empty() {
        bail!("SOURCE_DISCOVERY item has no URL");
    }
    info!(item_id = %item.id, url = %url, "Analyzing source");

    // Step 1: one fetch attempt for context; search snippets only when the
    // fetch failed.
    let fetch = attempt_fetch(&ctx.http, &url).await;
    let search_results = if fetch.category != FetchCategory::Success {
        gather_search_context(ctx, &url).await
    } else {
        Vec::new()
    };

    // Step 2: run the analysis.
    let analyzer = SourceAnalyzer::new(ctx.http.clone(), ctx.agent.clone());
    let input = AnalysisInput {
        url: url.clone(),
        company_name: item.company_name.clone(),
        fetch: Some(fetch),
        search_results,
    };
    let analysis = analyzer.analyze(&input).await?;

    info!(
        item_id = %item.id,
        classification = %analysis.classification,
        should_disable = analysis.should_disable,
        confidence = analysis.confidence,
        "Source analysis complete"
    );

    // Step 3: resolve company and aggregator identity.
    let aggregator_domain = match analysis.classification {
        Classification::JobAggregator => analysis
            .aggregator_domain
            .clone()
            .or_else(|| Some(jobsignal_common::extract_domain(&url))),
        _ => None,
    };
    let company_name = item
        .company_name
        .clone()
        .or_else(|| analysis.company_name.clone());

    let mut company_id = item.company_id;
    let mut company_created = false;
    if company_id.is_none() {
        if let Some(name) = &company_name {
            let existing = ctx.companies.get_by_name(name).await?;
            company_created = existing.is_none();
            company_id = Some(match existing {
                Some(company) => company.id,
                None => ctx.companies.create_stub(name).await?,
            });
        }
    }

    // Sources are company-or-aggregator; a company link wins.
    let aggregator_for_source = if company_id.is_some() {
        None
    } else {
        aggregator_domain.clone()
    };
    if company_id.is_none() && aggregator_for_source.is_none() {
        // Nothing to anchor the source to; treat the aggregator domain of
        // the URL itself as the anchor.
        return create_and_finish(
            ctx,
            item,
            &url,
            &analysis,
            company_name.as_deref(),
            None,
            Some(jobsignal_common::extract_domain(&url)),
            false,
        )
        .await;
    }

    // Step 4: duplicate pair check; reuse the existing source.
    if let Some(existing) = ctx
        .sources
        .get_source_by_company_and_aggregator(company_id, aggregator_domain.as_deref())
        .await?
    {
        info!(item_id = %item.id, source_id = %existing.id, "Source already exists for pair");
        ctx.queue
            .update_status(
                item.id,
                QueueStatus::Success,
                StatusUpdate::message(format!("Existing source: {}", existing.name))
                    .with_scraped_data(serde_json::json!({ "source_id": existing.id })),
            )
            .await?;
        return Ok(());
    }

    create_and_finish(
        ctx,
        item,
        &url,
        &analysis,
        company_name.as_deref(),
        company_id,
        aggregator_for_source,
        company_created,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn create_and_finish(
    ctx: &ProcessorContext,
    item: &QueueItem,
    url: &str,
    analysis: &crate::analysis::AnalysisResult,
    company_name: Option<&str>,
    company_id: Option<Uuid>,
    aggregator_domain: Option<String>,
    company_created: bool,
) -> Result<()> {
    // Display name: "<company> Jobs (<aggregator>)" with fallbacks.
    let source_name = match (company_name, aggregator_domain.as_deref()) {
        (Some(company), Some(aggregator)) => format!("{company} Jobs ({aggregator})"),
        (Some(company), None) => format!("{company} Jobs"),
        (None, Some(aggregator)) => {
            let label = aggregator.split('.').next().unwrap_or(aggregator);
            let mut chars = label.chars();
            let title = match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => label.to_string(),
            };
            format!("{title} Jobs")
        }
        (None, None) => format!("{} Jobs", jobsignal_common::extract_domain(url)),
    };

    let mut config = analysis.source_config.clone().unwrap_or_else(|| {
        // No usable config; keep the URL so a later re-analysis can start
        // from it.
        let mut fallback = SourceConfig::new(SourceType::Html, url);
        fallback.job_selector = Some(".job".to_string());
        fallback
            .fields
            .insert("title".to_string(), ".title".to_string());
        fallback.fields.insert("url".to_string(), "a@href".to_string());
        fallback
    });

    let should_disable = analysis.should_disable
        || matches!(
            analysis.classification,
            Classification::SingleJobListing
                | Classification::AtsProviderSite
                | Classification::Invalid
        );
    let disabled_notes = if analysis.disable_notes.is_empty() {
        format!("Invalid source type: {}", analysis.classification)
    } else {
        analysis.disable_notes.clone()
    };

    if should_disable {
        config
            .disabled_notes
            .push(format!("[{}] {}", chrono::Utc::now().to_rfc3339(), disabled_notes));
        config.disabled_at = Some(chrono::Utc::now());
    }

    let status = if should_disable {
        SourceStatus::Disabled
    } else {
        SourceStatus::Active
    };
    let source_type = config.source_type;

    let source_id = match ctx
        .sources
        .add_source(NewSource {
            name: source_name.clone(),
            source_type,
            config: config.clone(),
            company_id,
            aggregator_domain,
            tags: Vec::new(),
            status,
        })
        .await
    {
        Ok(id) => id,
        Err(e) => {
            // Raced with another discovery item; reuse whoever won.
            if let Some(existing) = ctx.sources.get_source_by_name(&source_name).await? {
                info!(item_id = %item.id, source_id = %existing.id, "Source created concurrently");
                existing.id
            } else {
                return Err(e);
            }
        }
    };

    // Step 5: follow-up spawns, only for live sources.
    if status == SourceStatus::Active {
        let mut scrape = NewQueueItem::new(QueueItemType::ScrapeSource, config.url.clone());
        scrape.company_name = company_name.map(str::to_string);
        scrape.company_id = company_id;
        scrape.source_id = Some(source_id);
        if ctx.queue.spawn_item_safely(item, scrape).await?.is_some() {
            info!(item_id = %item.id, source_id = %source_id, "Spawned SCRAPE_SOURCE");
        }
    } else {
        info!(item_id = %item.id, source_id = %source_id, notes = %disabled_notes, "Source created disabled");
    }

    if company_created && company_id.is_some() {
        let base_url = base_url_of(url);
        let mut child = NewQueueItem::new(QueueItemType::Company, base_url);
        child.company_name = company_name.map(str::to_string);
        child.company_id = company_id;
        if ctx.queue.spawn_item_safely(item, child).await?.is_some() {
            info!(item_id = %item.id, company = ?company_name, "Spawned COMPANY for new stub");
        }
    }

    ctx.queue
        .update_status(
            item.id,
            QueueStatus::Success,
            StatusUpdate::message(format!("Created source {source_name}")).with_scraped_data(
                serde_json::json!({
                    "source_id": source_id,
                    "source_type": source_type,
                    "disabled_notes": if should_disable { disabled_notes.as_str() } else { "" },
                }),
            ),
        )
        .await?;
    Ok(())
}

async fn gather_search_context(
    ctx: &ProcessorContext,
    url: &str,
) -> Vec<jobsignal_common::SearchResult> {
    let Some(search) = ctx.search.as_ref() else {
        return Vec::new();
    };
    let domain = jobsignal_common::extract_domain(url);
    let mut results = Vec::new();
    for query in [
        format!("{domain} jobs api"),
        format!("{domain} careers api documentation"),
    ] {
        if let Ok(found) = search.search(&query, 3).await {
            results.extend(found);
        }
    }
    results
}

fn base_url_of(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => format!("{}://{host}", parsed.scheme()),
            None => url.to_string(),
        },
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_extraction() {
        assert_eq!(
            base_url_of("https://boards.greenhouse.io/cloudflare/jobs/1"),
            "https://boards.greenhouse.io"
        );
        assert_eq!(base_url_of("not a url"), "not a url");
    }
}
