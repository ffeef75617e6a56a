//! The cheap structured pre-filter that gates postings before any
//! expensive analysis.
//!
//! Design rule, inviolable: missing data passes. Only explicit evidence
//! rejects, and every check records whether it ran or was skipped.

use jobsignal_common::{Posting, PrefilterPolicy};
use jobsignal_scraper::dates::parse_job_date;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::location::{
    extract_job_location, infer_work_arrangement, is_in_user_location, timezone_diff_hours,
    WorkArrangement,
};
use crate::salary::extract_salary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreFilterDecision {
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub checks_performed: Vec<String>,
    pub checks_skipped: Vec<String>,
}

impl PreFilterDecision {
    fn pass(checks_performed: Vec<String>, checks_skipped: Vec<String>) -> Self {
        Self {
            passed: true,
            reason: None,
            checks_performed,
            checks_skipped,
        }
    }

    fn reject(
        reason: String,
        checks_performed: Vec<String>,
        checks_skipped: Vec<String>,
    ) -> Self {
        Self {
            passed: false,
            reason: Some(reason),
            checks_performed,
            checks_skipped,
        }
    }
}

pub struct PreFilter {
    policy: PrefilterPolicy,
    required_keywords: Vec<String>,
    excluded_keywords: Vec<String>,
    rejected_tech: Vec<String>,
}

impl PreFilter {
    pub fn new(policy: PrefilterPolicy) -> Self {
        let required_keywords = policy
            .title
            .required_keywords
            .iter()
            .map(|k| k.to_lowercase().trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let excluded_keywords = policy
            .title
            .excluded_keywords
            .iter()
            .map(|k| k.to_lowercase().trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let rejected_tech = policy
            .technology
            .rejected
            .iter()
            .map(|t| t.to_lowercase().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        Self {
            policy,
            required_keywords,
            excluded_keywords,
            rejected_tech,
        }
    }

    /// Evaluate a posting. `is_remote_source` marks remote-only boards whose
    /// postings are all remote regardless of location text.
    pub fn filter(&self, posting: &Posting, is_remote_source: bool) -> PreFilterDecision {
        let mut performed: Vec<String> = Vec::new();
        let mut skipped: Vec<String> = Vec::new();

        // 1. Title
        if !posting.title.trim().is_empty() {
            performed.push("title".into());
            if let Some(reason) = self.check_title(&posting.title) {
                return PreFilterDecision::reject(reason, performed, skipped);
            }
        } else {
            skipped.push("title".into());
        }

        // 2. Freshness
        if self.policy.freshness.max_age_days > 0 {
            match posting.posted_date.as_deref().and_then(parse_job_date) {
                Some(posted) => {
                    performed.push("freshness".into());
                    let age_days = (chrono::Utc::now() - posted).num_days();
                    if age_days > self.policy.freshness.max_age_days {
                        return PreFilterDecision::reject(
                            format!(
                                "Job is {age_days} days old (max: {})",
                                self.policy.freshness.max_age_days
                            ),
                            performed,
                            skipped,
                        );
                    }
                }
                None => skipped.push("freshness".into()),
            }
        } else {
            skipped.push("freshness".into());
        }

        // 3. Work arrangement
        let work = &self.policy.work_arrangement;
        let arrangement =
            infer_work_arrangement(posting, is_remote_source, &work.remote_keywords);
        match arrangement {
            Some(arrangement) => {
                performed.push("workArrangement".into());
                if let Some(reason) = self.check_work_arrangement(arrangement, posting) {
                    return PreFilterDecision::reject(reason, performed, skipped);
                }
            }
            None if work.treat_unknown_as_onsite
                && !work.will_relocate
                && work.user_location.is_some() =>
            {
                performed.push("workArrangement".into());
                let user_location = work.user_location.as_deref().unwrap_or_default();
                if is_in_user_location(posting, user_location) == Some(false) {
                    return PreFilterDecision::reject(
                        format!("Unknown work arrangement with location outside {user_location}"),
                        performed,
                        skipped,
                    );
                }
            }
            None => skipped.push("workArrangement".into()),
        }

        // 4. Employment type
        match normalize_employment_type(posting) {
            Some(emp_type) => {
                performed.push("employmentType".into());
                if let Some(reason) = self.check_employment_type(&emp_type) {
                    return PreFilterDecision::reject(reason, performed, skipped);
                }
            }
            None => skipped.push("employmentType".into()),
        }

        // 5. Salary floor
        if let Some(minimum) = self.policy.salary.minimum {
            match extract_salary(posting) {
                Some(salary) => {
                    performed.push("salary".into());
                    if salary < minimum {
                        return PreFilterDecision::reject(
                            format!("Salary ${salary} below minimum ${minimum}"),
                            performed,
                            skipped,
                        );
                    }
                }
                None => skipped.push("salary".into()),
            }
        } else {
            skipped.push("salary".into());
        }

        // 6. Technology rejection
        if !self.rejected_tech.is_empty() {
            if !posting.tags.is_empty() {
                performed.push("technology".into());
                let tags: Vec<String> =
                    posting.tags.iter().map(|t| t.to_lowercase()).collect();
                let rejected: Vec<&String> = self
                    .rejected_tech
                    .iter()
                    .filter(|t| tags.iter().any(|tag| tag.trim() == t.as_str()))
                    .collect();
                if !rejected.is_empty() {
                    let names: Vec<&str> = rejected.iter().map(|s| s.as_str()).collect();
                    return PreFilterDecision::reject(
                        format!("Contains rejected technology: {}", names.join(", ")),
                        performed,
                        skipped,
                    );
                }
            } else {
                skipped.push("technology".into());
            }
        } else {
            skipped.push("technology".into());
        }

        debug!(
            title = %posting.title,
            performed = performed.len(),
            skipped = skipped.len(),
            "Pre-filter passed"
        );
        PreFilterDecision::pass(performed, skipped)
    }

    fn check_title(&self, title: &str) -> Option<String> {
        let title_lower = title.to_lowercase();

        for keyword in &self.excluded_keywords {
            if title_lower.contains(keyword.as_str()) {
                return Some(format!("Title contains excluded keyword: '{keyword}'"));
            }
        }

        if !self.required_keywords.is_empty()
            && !self
                .required_keywords
                .iter()
                .any(|kw| title_lower.contains(kw.as_str()))
        {
            return Some("Title missing required keywords".to_string());
        }

        None
    }

    fn check_work_arrangement(
        &self,
        arrangement: WorkArrangement,
        posting: &Posting,
    ) -> Option<String> {
        let work = &self.policy.work_arrangement;

        match arrangement {
            WorkArrangement::Remote if !work.allow_remote => {
                return Some("Remote positions not allowed".to_string());
            }
            WorkArrangement::Hybrid if !work.allow_hybrid => {
                return Some("Hybrid positions not allowed".to_string());
            }
            WorkArrangement::Onsite if !work.allow_onsite => {
                return Some("Onsite positions not allowed".to_string());
            }
            _ => {}
        }

        // Hybrid and onsite roles have to be reachable.
        if matches!(arrangement, WorkArrangement::Hybrid | WorkArrangement::Onsite)
            && !work.will_relocate
        {
            if let Some(user_location) = work.user_location.as_deref() {
                if is_in_user_location(posting, user_location) == Some(false) {
                    let kind = match arrangement {
                        WorkArrangement::Hybrid => "Hybrid",
                        _ => "Onsite",
                    };
                    return Some(format!("{kind} roles must be in {user_location}"));
                }
            }
        }

        // Optional timezone guard for remote/hybrid.
        if let (Some(max_diff), Some(user_location)) = (
            work.max_timezone_diff_hours,
            work.user_location.as_deref(),
        ) {
            if matches!(arrangement, WorkArrangement::Remote | WorkArrangement::Hybrid) {
                if let Some(job_location) = extract_job_location(posting) {
                    if let Some(diff) = timezone_diff_hours(user_location, &job_location) {
                        if diff > max_diff {
                            return Some(format!(
                                "Timezone diff {diff:.1}h > {max_diff}h ({user_location} vs {job_location})"
                            ));
                        }
                    }
                }
            }
        }

        None
    }

    fn check_employment_type(&self, emp_type: &str) -> Option<String> {
        let emp = &self.policy.employment_type;
        match emp_type {
            "full-time" if !emp.allow_full_time => {
                Some("Full-time positions not allowed".to_string())
            }
            "part-time" if !emp.allow_part_time => {
                Some("Part-time positions not allowed".to_string())
            }
            "contract" if !emp.allow_contract => {
                Some("Contract positions not allowed".to_string())
            }
            _ => None,
        }
    }
}

/// Normalize an employment-type label to `full-time`/`part-time`/`contract`.
fn normalize_employment_type(posting: &Posting) -> Option<String> {
    let raw = posting.employment_type.as_deref()?;
    if raw.is_empty() {
        return None;
    }
    let lower = raw.to_lowercase().replace(['_', ' '], "-");
    if lower.contains("full") {
        return Some("full-time".to_string());
    }
    if lower.contains("part") {
        return Some("part-time".to_string());
    }
    if lower.contains("contract") || lower.contains("freelance") {
        return Some("contract".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsignal_common::policy::*;

    fn policy() -> PrefilterPolicy {
        PrefilterPolicy {
            title: TitlePolicy {
                required_keywords: vec![],
                excluded_keywords: vec!["sales".into(), "recruiter".into()],
            },
            freshness: FreshnessPolicy { max_age_days: 14 },
            work_arrangement: WorkArrangementPolicy {
                allow_remote: true,
                allow_hybrid: true,
                allow_onsite: false,
                will_relocate: false,
                user_location: Some("Portland, OR".to_string()),
                treat_unknown_as_onsite: false,
                max_timezone_diff_hours: None,
                ..Default::default()
            },
            employment_type: EmploymentTypePolicy {
                allow_contract: false,
                ..Default::default()
            },
            salary: SalaryFloorPolicy {
                minimum: Some(120_000),
            },
            technology: TechnologyRejectPolicy {
                rejected: vec!["php".into()],
            },
        }
    }

    fn remote_posting(title: &str) -> Posting {
        let mut p = Posting::new(title, "https://x.test/1");
        p.location = "Remote".to_string();
        p
    }

    #[test]
    fn title_only_posting_skips_everything_else() {
        let filter = PreFilter::new(policy());
        let p = Posting::new("Senior Engineer", "https://x.test/1");
        let decision = filter.filter(&p, false);
        assert!(decision.passed);
        assert_eq!(decision.checks_performed, vec!["title"]);
        for check in ["freshness", "workArrangement", "employmentType", "salary", "technology"] {
            assert!(
                decision.checks_skipped.iter().any(|c| c == check),
                "{check} should be skipped"
            );
        }
    }

    #[test]
    fn excluded_title_keyword_rejects() {
        let filter = PreFilter::new(policy());
        let decision = filter.filter(&remote_posting("Senior Sales Manager"), false);
        assert!(!decision.passed);
        assert!(decision.reason.unwrap().contains("sales"));
    }

    #[test]
    fn required_keywords_enforced_when_configured() {
        let mut p = policy();
        p.title.required_keywords = vec!["engineer".into()];
        let filter = PreFilter::new(p);
        assert!(filter.filter(&remote_posting("Staff Engineer"), false).passed);
        assert!(!filter.filter(&remote_posting("Product Designer"), false).passed);
    }

    #[test]
    fn stale_posting_rejected_unparseable_skipped() {
        let filter = PreFilter::new(policy());

        let mut p = remote_posting("Engineer");
        p.posted_date = Some((chrono::Utc::now() - chrono::Duration::days(30)).to_rfc3339());
        let decision = filter.filter(&p, false);
        assert!(!decision.passed);
        assert!(decision.reason.unwrap().contains("days old"));

        p.posted_date = Some("around easter".to_string());
        let decision = filter.filter(&p, false);
        assert!(decision.passed);
        assert!(decision.checks_skipped.iter().any(|c| c == "freshness"));
    }

    #[test]
    fn onsite_not_allowed() {
        let filter = PreFilter::new(policy());
        let mut p = Posting::new("Engineer", "https://x.test/1");
        p.metadata.insert("Location Type".into(), "Onsite".into());
        let decision = filter.filter(&p, false);
        assert!(!decision.passed);
        assert!(decision.reason.unwrap().contains("Onsite"));
    }

    #[test]
    fn hybrid_outside_user_city_rejected() {
        let filter = PreFilter::new(policy());
        let mut p = Posting::new("Engineer", "https://x.test/1");
        p.location = "New York, NY (Hybrid)".to_string();
        let decision = filter.filter(&p, false);
        assert!(!decision.passed);
        assert!(decision.reason.unwrap().contains("Portland"));
    }

    #[test]
    fn remote_source_overrides_location_text() {
        let filter = PreFilter::new(policy());
        let mut p = Posting::new("Engineer", "https://x.test/1");
        p.location = "New York, NY".to_string();
        let decision = filter.filter(&p, true);
        assert!(decision.passed, "remote source treats postings as remote");
    }

    #[test]
    fn contract_rejected() {
        let filter = PreFilter::new(policy());
        let mut p = remote_posting("Engineer");
        p.employment_type = Some("Contract".to_string());
        assert!(!filter.filter(&p, false).passed);

        p.employment_type = Some("Full Time".to_string());
        assert!(filter.filter(&p, false).passed);
    }

    #[test]
    fn salary_floor_with_unparseable_skip() {
        let filter = PreFilter::new(policy());
        let mut p = remote_posting("Engineer");
        p.salary = Some("$90k - $110k".to_string());
        let decision = filter.filter(&p, false);
        assert!(!decision.passed);

        p.salary = Some("competitive".to_string());
        let decision = filter.filter(&p, false);
        assert!(decision.passed);
        assert!(decision.checks_skipped.iter().any(|c| c == "salary"));
    }

    #[test]
    fn rejected_technology_tag() {
        let filter = PreFilter::new(policy());
        let mut p = remote_posting("Engineer");
        p.tags = vec!["PHP".to_string(), "mysql".to_string()];
        let decision = filter.filter(&p, false);
        assert!(!decision.passed);
        assert!(decision.reason.unwrap().contains("php"));
    }

    #[test]
    fn timezone_guard_rejects_far_remote() {
        let mut pol = policy();
        pol.work_arrangement.max_timezone_diff_hours = Some(4.0);
        let filter = PreFilter::new(pol);

        let mut p = Posting::new("Engineer", "https://x.test/1");
        p.is_remote = Some(true);
        p.location = "Tokyo".to_string();
        let decision = filter.filter(&p, false);
        assert!(!decision.passed);
        assert!(decision.reason.unwrap().contains("Timezone"));
    }

    #[test]
    fn treat_unknown_as_onsite_applies_location_rule() {
        let mut pol = policy();
        pol.work_arrangement.treat_unknown_as_onsite = true;
        let filter = PreFilter::new(pol);

        let mut p = Posting::new("Engineer", "https://x.test/1");
        p.location = "Austin, TX".to_string();
        let decision = filter.filter(&p, false);
        assert!(!decision.passed);
        assert!(decision.reason.unwrap().contains("Unknown work arrangement"));
    }
}
