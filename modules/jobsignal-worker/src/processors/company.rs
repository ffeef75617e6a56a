//! COMPANY processor: single-pass, search-first enrichment.
//!
//! A company task succeeds if any record gets saved; data quality is
//! tracked on the record, not the task. Only a missing company name is
//! unrecoverable.

use anyhow::{bail, Result};
use jobsignal_common::{
    extract_domain, DataQuality, NewQueueItem, QueueItem, QueueItemType, QueueStatus,
};
use jobsignal_store::StatusUpdate;
use tracing::info;

use crate::company_info::CompanyInfo;
use crate::context::ProcessorContext;
use crate::platforms::probe_company_ats;
use crate::processors::source_context_for;

pub async fn process(ctx: &ProcessorContext, item: &QueueItem) -> Result<()> {
    let Some(company_name) = item.company_name.clone().filter(|n| !n.trim().is_empty()) else {
        bail!("COMPANY item has no company name");
    };
    info!(item_id = %item.id, company = %company_name, "Enriching company");

    let url_hint = (!item.url.is_empty()).then(|| item.url.clone());
    let source_context = source_context_for(ctx, item).await;

    // Collect the aggregator knowledge up front so the fetcher's URL guard
    // stays synchronous.
    let hint_is_job_board = match url_hint.as_deref() {
        Some(url) => ctx.sources.is_job_board_url(url).await?,
        None => false,
    };

    let info = ctx
        .company_info
        .fetch_company_info(
            &company_name,
            url_hint.as_deref(),
            source_context.as_ref(),
            |_| hint_is_job_board,
        )
        .await;

    let about_len = info.about.len();
    let culture_len = info.culture.len();
    let data_quality = if about_len >= 100 && culture_len >= 50 {
        DataQuality::Complete
    } else if about_len >= 50 || culture_len >= 25 {
        DataQuality::Partial
    } else {
        DataQuality::Minimal
    };

    let company_id = ctx
        .companies
        .upsert(&info.to_company_record(&company_name))
        .await?;
    info!(item_id = %item.id, company_id = %company_id, ?data_quality, "Company saved");

    // A job-board URL in hand means we can try to register a source for it.
    let job_board_url = detect_job_board_url(ctx, url_hint.as_deref(), &info).await?;

    let mut source_spawned = false;
    if let Some(board_url) = &job_board_url {
        if ctx.sources.get_source_for_url(board_url).await?.is_none() {
            let mut child = NewQueueItem::new(QueueItemType::SourceDiscovery, board_url.clone());
            child.company_name = Some(company_name.clone());
            child.company_id = Some(company_id);
            source_spawned = ctx
                .queue
                .spawn_item_safely(item, child)
                .await?
                .is_some();
        }
    }

    let mut result_parts = vec![
        format!("Company saved ({} data)", quality_label(data_quality)),
        format!("about={about_len} chars, culture={culture_len} chars"),
    ];
    if !info.tech_stack.is_empty() {
        result_parts.push(format!("tech_stack={}", info.tech_stack.len()));
    }
    if job_board_url.is_some() {
        result_parts.push(
            if source_spawned {
                "job_board_spawned"
            } else {
                "job_board_exists"
            }
            .to_string(),
        );
    }

    ctx.queue
        .update_status(
            item.id,
            QueueStatus::Success,
            StatusUpdate::message(result_parts.join("; ")),
        )
        .await?;
    Ok(())
}

/// The URL that should seed SOURCE_DISCOVERY: a provided job-board URL
/// wins; otherwise probe the big ATS vendors with a slug derived from the
/// company website or name.
async fn detect_job_board_url(
    ctx: &ProcessorContext,
    provided_url: Option<&str>,
    info: &CompanyInfo,
) -> Result<Option<String>> {
    if let Some(url) = provided_url {
        if ctx.sources.is_job_board_url(url).await? {
            return Ok(Some(url.to_string()));
        }
    }

    let slug = company_slug(info);
    if let Some(slug) = slug {
        if let Some(board_url) = probe_company_ats(&ctx.http, &slug).await {
            info!(slug, board_url, "ATS probe found a board for company");
            return Ok(Some(board_url));
        }
    }
    Ok(None)
}

/// Candidate ATS slug: the website's registrable-domain label, else the
/// lowercased single-token company name.
fn company_slug(info: &CompanyInfo) -> Option<String> {
    if !info.website.is_empty() {
        let domain = extract_domain(&info.website);
        let label = domain
            .trim_start_matches("www.")
            .split('.')
            .next()
            .unwrap_or_default();
        if label.len() >= 3 {
            return Some(label.to_lowercase());
        }
    }
    let name = info.name.trim().to_lowercase();
    (!name.is_empty() && !name.contains(' ')).then_some(name)
}

fn quality_label(quality: DataQuality) -> &'static str {
    match quality {
        DataQuality::Complete => "complete",
        DataQuality::Partial => "partial",
        DataQuality::Minimal => "minimal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_prefers_website_label() {
        let info = CompanyInfo {
            name: "Cloudflare Inc".to_string(),
            website: "https://www.cloudflare.com".to_string(),
            ..Default::default()
        };
        assert_eq!(company_slug(&info), Some("cloudflare".to_string()));
    }

    #[test]
    fn slug_falls_back_to_single_token_name() {
        let info = CompanyInfo {
            name: "Stripe".to_string(),
            ..Default::default()
        };
        assert_eq!(company_slug(&info), Some("stripe".to_string()));

        let multi = CompanyInfo {
            name: "Two Words".to_string(),
            ..Default::default()
        };
        assert_eq!(company_slug(&multi), None);
    }
}
