//! Failure routing. Ordinary failures terminate as FAILED with diagnostics;
//! exhaustion of the optional collaborators (LLM, search) is not the item's
//! fault and parks as NEEDS_REVIEW, with an LLM post-mortem attached when an
//! agent is available.

use ai_client::TaskType;
use jobsignal_common::{QueueItem, QueueStatus};
use jobsignal_store::StatusUpdate;
use tracing::warn;

use crate::context::ProcessorContext;

const REVIEW_MARKERS: [&str; 5] = [
    "claude api error",
    "llm",
    "serper",
    "search api",
    "rate limit",
];

fn needs_review(error_text: &str) -> bool {
    let lower = error_text.to_lowercase();
    REVIEW_MARKERS.iter().any(|m| lower.contains(m))
}

/// Convert a processor error into the item's terminal state. Best-effort:
/// a failed write here is logged, never propagated, so one poisoned item
/// cannot take its worker down.
pub async fn handle_failure(ctx: &ProcessorContext, item: &QueueItem, error: &anyhow::Error) {
    let error_text = format!("{error:#}");

    let (status, mut message) = if needs_review(&error_text) {
        (
            QueueStatus::NeedsReview,
            format!("Needs review: {error}"),
        )
    } else {
        (QueueStatus::Failed, format!("Error: {error}"))
    };

    if status == QueueStatus::NeedsReview {
        if let Some(post_mortem) = post_mortem(ctx, item, &error_text).await {
            message = format!("{message} | post-mortem: {post_mortem}");
        }
    }

    let update = StatusUpdate::message(message).with_error(error_text);
    if let Err(e) = ctx.queue.update_status(item.id, status, update).await {
        warn!(item_id = %item.id, error = %e, "Could not record item failure");
    }
}

/// One short LLM diagnosis of what went wrong, when an agent is configured.
async fn post_mortem(ctx: &ProcessorContext, item: &QueueItem, error_text: &str) -> Option<String> {
    let agent = ctx.agent.as_ref()?;
    let prompt = format!(
        "A job-pipeline task failed. In one or two sentences, state the likely root cause and \
         whether retrying could help.\n\nTask type: {}\nURL: {}\nError:\n{}",
        item.item_type,
        item.url,
        error_text.chars().take(2000).collect::<String>(),
    );

    match agent.execute(TaskType::FailureReview, &prompt, 256, 0.0).await {
        Ok(text) => {
            let text = text.trim().to_string();
            (!text.is_empty()).then_some(text)
        }
        Err(e) => {
            warn!(item_id = %item.id, error = %e, "Post-mortem generation failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_errors_route_to_review() {
        assert!(needs_review("Claude API error (529): overloaded"));
        assert!(needs_review("Serper API request failed"));
        assert!(needs_review("upstream rate limit hit"));
        assert!(!needs_review("Could not scrape job details from URL"));
        assert!(!needs_review("Invalid config: url is empty"));
    }
}
