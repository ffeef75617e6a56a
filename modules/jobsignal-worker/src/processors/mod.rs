//! Per-type task processors behind a flat routing table.

pub mod agent_review;
pub mod company;
pub mod job;
pub mod scrape_source;
pub mod source_discovery;

use anyhow::Result;
use jobsignal_common::{QueueItem, QueueItemType};
use tracing::error;

use crate::company_info::SourceContext;
use crate::context::ProcessorContext;

/// Route a leased item to its processor. Processor errors are converted to
/// terminal states here; this function itself only fails on store errors
/// while recording the failure.
pub async fn dispatch(ctx: &ProcessorContext, item: &QueueItem) -> Result<()> {
    let outcome = match item.item_type {
        QueueItemType::Job => job::process(ctx, item).await,
        QueueItemType::Company => company::process(ctx, item).await,
        QueueItemType::SourceDiscovery => source_discovery::process(ctx, item).await,
        QueueItemType::ScrapeSource => scrape_source::process(ctx, item).await,
    };

    if let Err(e) = outcome {
        error!(item_id = %item.id, item_type = %item.item_type, error = %e, "Processor failed");
        agent_review::handle_failure(ctx, item, &e).await;
    }
    Ok(())
}

/// Search context from the item's linked source, when there is one. Shared
/// by the JOB and COMPANY processors feeding the company info fetcher.
pub(crate) async fn source_context_for(
    ctx: &ProcessorContext,
    item: &QueueItem,
) -> Option<SourceContext> {
    let source_id = item.source_id?;
    let source = ctx.sources.get_source_by_id(source_id).await.ok()??;
    Some(SourceContext {
        aggregator_domain: source.aggregator_domain.clone(),
        base_url: source
            .config
            .base_url
            .clone()
            .or(Some(source.config.url.clone())),
    })
}
