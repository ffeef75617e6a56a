//! Scraper intake: bulk-inserts scraped postings into the queue with the
//! cheap filters applied up front.
//!
//! Each surviving posting becomes one JOB item with `job_data` already in
//! its pipeline state, so the JOB pipeline enters directly at the filter
//! stage.

use anyhow::Result;
use jobsignal_common::{NewQueueItem, Posting, QueueItemType};
use jobsignal_filters::PreFilter;
use jobsignal_store::QueueManager;
use tracing::{debug, info};
use uuid::Uuid;

pub struct IntakeStats {
    pub received: usize,
    pub duplicates: usize,
    pub title_filtered: usize,
    pub prefiltered: usize,
    pub inserted: usize,
}

pub struct ScraperIntake<'a> {
    queue: &'a QueueManager,
    prefilter: &'a PreFilter,
    title_allow: Vec<String>,
    title_deny: Vec<String>,
}

impl<'a> ScraperIntake<'a> {
    pub fn new(queue: &'a QueueManager, prefilter: &'a PreFilter) -> Self {
        Self {
            queue,
            prefilter,
            title_allow: Vec::new(),
            title_deny: Vec::new(),
        }
    }

    /// Cheap title-only allow/deny lists, applied before the pre-filter.
    pub fn with_title_filter(mut self, allow: Vec<String>, deny: Vec<String>) -> Self {
        self.title_allow = allow.iter().map(|s| s.to_lowercase()).collect();
        self.title_deny = deny.iter().map(|s| s.to_lowercase()).collect();
        self
    }

    /// Submit scraped postings. Returns how many queue items were inserted.
    pub async fn submit_jobs(
        &self,
        jobs: &[Posting],
        source_label: &str,
        company_id: Option<Uuid>,
        is_remote_source: bool,
    ) -> Result<IntakeStats> {
        let mut stats = IntakeStats {
            received: jobs.len(),
            duplicates: 0,
            title_filtered: 0,
            prefiltered: 0,
            inserted: 0,
        };

        for posting in jobs {
            // Intake only accepts rows a human could act on.
            if posting.title.trim().is_empty() || posting.url.trim().is_empty() {
                stats.prefiltered += 1;
                continue;
            }

            if self.queue.url_exists_in_queue(&posting.url).await? {
                stats.duplicates += 1;
                continue;
            }

            if !self.passes_title_filter(&posting.title) {
                stats.title_filtered += 1;
                debug!(title = %posting.title, "Intake title filter rejected posting");
                continue;
            }

            let decision = self.prefilter.filter(posting, is_remote_source);
            if !decision.passed {
                stats.prefiltered += 1;
                debug!(
                    title = %posting.title,
                    reason = decision.reason.as_deref().unwrap_or(""),
                    "Intake pre-filter rejected posting"
                );
                continue;
            }

            let mut item = NewQueueItem::new(QueueItemType::Job, posting.url.clone());
            item.company_name = (!posting.company.is_empty()).then(|| posting.company.clone());
            item.company_id = company_id;
            item.pipeline_stage = Some("filter".to_string());
            item.pipeline_state = Some(serde_json::json!({
                "job_data": posting,
                "source_label": source_label,
            }));
            self.queue.add_item(item).await?;
            stats.inserted += 1;
        }

        info!(
            source = source_label,
            received = stats.received,
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            title_filtered = stats.title_filtered,
            prefiltered = stats.prefiltered,
            "Intake complete"
        );
        Ok(stats)
    }

    fn passes_title_filter(&self, title: &str) -> bool {
        title_passes(&self.title_allow, &self.title_deny, title)
    }
}

/// Title-only allow/deny check. Deny wins; an empty allow list admits
/// everything.
fn title_passes(allow: &[String], deny: &[String], title: &str) -> bool {
    let title_lower = title.to_lowercase();
    if deny.iter().any(|d| title_lower.contains(d.as_str())) {
        return false;
    }
    if !allow.is_empty() && !allow.iter().any(|a| title_lower.contains(a.as_str())) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_lowercase()).collect()
    }

    #[test]
    fn title_filter_allow_and_deny() {
        let allow = list(&["engineer"]);
        let deny = list(&["sales"]);

        assert!(title_passes(&allow, &deny, "Senior Engineer"));
        assert!(!title_passes(&allow, &deny, "Sales Engineer"), "deny wins");
        assert!(!title_passes(&allow, &[], "Product Designer"));
        assert!(title_passes(&[], &[], "Anything"));
    }
}
