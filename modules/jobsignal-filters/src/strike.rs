//! Two-tier strike filter: hard rejections fail immediately, everything
//! else accumulates weighted strikes against a threshold.

use jobsignal_common::policy::TechRank;
use jobsignal_common::{MatchPolicy, Posting};
use jobsignal_scraper::dates::parse_job_date;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::location::{evaluate_location_rules, timezone_offset_for, LocationContext};
use crate::salary::parse_salary_string;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strike {
    pub category: String,
    pub name: String,
    pub reason: String,
    pub detail: String,
    pub points: i32,
    /// "strike" or "hard_reject".
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    pub passed: bool,
    pub total_strikes: i32,
    pub strike_threshold: i32,
    pub strikes: Vec<Strike>,
}

impl FilterResult {
    fn new(threshold: i32) -> Self {
        Self {
            passed: true,
            total_strikes: 0,
            strike_threshold: threshold,
            strikes: Vec::new(),
        }
    }

    fn add_strike(&mut self, category: &str, name: &str, reason: String, detail: String, points: i32) {
        self.strikes.push(Strike {
            category: category.to_string(),
            name: name.to_string(),
            reason,
            detail,
            points,
            severity: "strike".to_string(),
        });
        self.total_strikes += points;
        if self.total_strikes >= self.strike_threshold {
            self.passed = false;
        }
    }

    fn add_rejection(&mut self, category: &str, name: &str, reason: String, detail: String) {
        self.strikes.push(Strike {
            category: category.to_string(),
            name: name.to_string(),
            reason,
            detail,
            points: 0,
            severity: "hard_reject".to_string(),
        });
        self.passed = false;
    }

    pub fn hard_rejections(&self) -> impl Iterator<Item = &Strike> {
        self.strikes.iter().filter(|s| s.severity == "hard_reject")
    }

    pub fn rejection_summary(&self) -> String {
        if let Some(hard) = self.hard_rejections().next() {
            return hard.reason.clone();
        }
        format!(
            "{}/{} strikes",
            self.total_strikes, self.strike_threshold
        )
    }
}

const COMMISSION_INDICATORS: [&str; 6] = [
    "commission only",
    "commission-only",
    "unlimited earning potential",
    "mlm",
    "multi-level marketing",
    "be your own boss",
];

pub struct StrikeEngine {
    policy: MatchPolicy,
}

impl StrikeEngine {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    /// An always-pass result for bypass scenarios.
    pub fn empty_pass_result(&self) -> FilterResult {
        FilterResult::new(self.policy.strike_engine.strike_threshold)
    }

    pub fn evaluate(&self, posting: &Posting) -> FilterResult {
        let engine = &self.policy.strike_engine;
        let mut result = FilterResult::new(engine.strike_threshold);
        if !engine.enabled {
            return result;
        }

        let title = posting.title.as_str();
        let description = posting.description.as_str();
        let salary = posting.salary.as_deref().unwrap_or_default();
        let posted_date = posting.posted_date.as_deref().unwrap_or_default();

        // === Tier 1: hard rejections ===

        self.check_required_title_keywords(title, &mut result);
        if !result.passed {
            return self.finish(posting, result);
        }

        if self.check_excluded_seniority(title, &mut result) {
            return self.finish(posting, result);
        }

        // Stop-list hits count as strikes rather than instant failure.
        self.check_stop_list(&posting.company, description, &posting.url, &mut result);
        if !result.passed {
            return self.finish(posting, result);
        }

        self.check_salary_floor(salary, &mut result);

        if self.check_commission_only(description, &mut result) {
            return self.finish(posting, result);
        }

        if self.check_location_policy(description, &posting.location, &mut result) {
            return self.finish(posting, result);
        }

        if self.check_too_old(posted_date, &mut result) {
            return self.finish(posting, result);
        }

        // === Tier 2: strike accumulation ===

        if engine.salary_strike.enabled {
            self.check_salary_strike(salary, &mut result);
        }
        self.check_seniority_strikes(title, &mut result);
        self.check_technology(title, description, &mut result);
        self.check_quality(description, &mut result);
        if engine.age_strike.enabled {
            self.check_age_strike(posted_date, &mut result);
        }

        self.finish(posting, result)
    }

    fn finish(&self, posting: &Posting, result: FilterResult) -> FilterResult {
        if result.passed {
            info!(
                title = %posting.title,
                strikes = result.total_strikes,
                threshold = result.strike_threshold,
                "Job passed filters"
            );
        } else {
            info!(
                title = %posting.title,
                reason = %result.rejection_summary(),
                "Job rejected by filters"
            );
        }
        result
    }

    // --- Tier 1 checks ---

    /// Whitelist: the title must contain at least one required keyword.
    /// Multi-word phrases match as substrings; single tokens need word
    /// boundaries (so `c++`/`c#` still work via lookaround-free edges).
    fn check_required_title_keywords(&self, title: &str, result: &mut FilterResult) {
        let required = &self.policy.strike_engine.hard_rejections.required_title_keywords;
        if title.is_empty() || required.is_empty() {
            return;
        }

        let title_lower = title.to_lowercase();
        let matched = required.iter().any(|kw| {
            let kw = kw.to_lowercase();
            if kw.contains(' ') {
                title_lower.contains(&kw)
            } else {
                token_match(&kw, &title_lower)
            }
        });

        if !matched {
            result.add_rejection(
                "title",
                "missing_required_title_keyword",
                "Title missing required keywords".to_string(),
                format!("Title '{title}' does not contain any of: {}", required.join(", ")),
            );
        }
    }

    fn check_excluded_seniority(&self, title: &str, result: &mut FilterResult) -> bool {
        let title_lower = title.to_lowercase();
        for seniority in &self.policy.strike_engine.hard_rejections.excluded_seniority {
            let pattern = seniority.to_lowercase();
            if word_boundary_match(&pattern, &title_lower) {
                result.add_rejection(
                    "seniority",
                    "excluded_seniority",
                    format!("Too junior: {seniority}"),
                    format!("Title contains '{seniority}' which is below required level"),
                );
                return true;
            }
        }
        false
    }

    fn check_stop_list(
        &self,
        company: &str,
        description: &str,
        url: &str,
        result: &mut FilterResult,
    ) {
        let stop = &self.policy.stop_list;
        let company_lower = company.to_lowercase();
        let description_lower = description.to_lowercase();
        let url_lower = url.to_lowercase();

        for excluded in &stop.excluded_companies {
            if !excluded.is_empty() && company_lower.contains(&excluded.to_lowercase()) {
                result.add_strike(
                    "stop_list",
                    "stop_list_company",
                    format!("Stop-list company: {excluded}"),
                    format!("Company '{company}' matches stop list"),
                    3,
                );
            }
        }
        for keyword in &stop.excluded_keywords {
            if !keyword.is_empty() && description_lower.contains(&keyword.to_lowercase()) {
                result.add_strike(
                    "stop_list",
                    "stop_list_keyword",
                    format!("Stop-list keyword: {keyword}"),
                    format!("Description contains '{keyword}'"),
                    2,
                );
            }
        }
        for domain in &stop.excluded_domains {
            if !domain.is_empty() && url_lower.contains(&domain.to_lowercase()) {
                result.add_strike(
                    "stop_list",
                    "stop_list_domain",
                    format!("Stop-list domain: {domain}"),
                    format!("URL '{url}' matches stop list"),
                    3,
                );
            }
        }
    }

    /// Below the hard floor takes heavy strikes (not an instant fail; the
    /// parse may have caught an hourly rate or partial figure).
    fn check_salary_floor(&self, salary: &str, result: &mut FilterResult) {
        if salary.is_empty() {
            return;
        }
        let floor = self.policy.strike_engine.hard_rejections.min_salary_floor;
        if let Some(max_salary) = parse_salary_string(salary) {
            if max_salary < floor {
                result.add_strike(
                    "salary",
                    "salary_floor",
                    format!("Salary below ${}k floor", floor / 1000),
                    format!("Max salary ${max_salary} is below minimum ${floor}"),
                    3,
                );
            }
        }
    }

    fn check_commission_only(&self, description: &str, result: &mut FilterResult) -> bool {
        if !self.policy.strike_engine.hard_rejections.reject_commission_only {
            return false;
        }
        let description_lower = description.to_lowercase();
        for indicator in COMMISSION_INDICATORS {
            if description_lower.contains(indicator) {
                result.add_rejection(
                    "quality",
                    "commission_only",
                    "Commission-only or MLM position".to_string(),
                    format!("Description contains '{indicator}'"),
                );
                return true;
            }
        }
        false
    }

    /// Unified remote/hybrid/onsite + relocation + timezone rules.
    fn check_location_policy(
        &self,
        description: &str,
        location: &str,
        result: &mut FilterResult,
    ) -> bool {
        let combined = format!("{} {}", description.to_lowercase(), location.to_lowercase());
        let location_lower = location.to_lowercase();

        let remote_markers = [
            "fully remote",
            "100% remote",
            "remote position",
            "remote role",
            "remote job",
            "remote opportunity",
            "remote work",
            "remote only",
            "remote-only",
            "work from home",
            "work from anywhere",
            "wfh",
            "remote-first",
            "remote friendly",
            "remote-friendly",
            "remotely",
            "hiring remote",
        ];
        let is_remote = remote_markers.iter().any(|m| combined.contains(m))
            || location_lower.contains("remote");
        let is_hybrid =
            ["hybrid", "days in office", "days remote"].iter().any(|m| combined.contains(m));
        let mut is_onsite = ["on-site", "onsite", "in-office", "office-based"]
            .iter()
            .any(|m| combined.contains(m));

        // A bare location with no arrangement markers reads as onsite.
        if !is_remote && !is_hybrid && !is_onsite && !location_lower.trim().is_empty() {
            is_onsite = true;
        }
        if !(is_remote || is_hybrid || is_onsite) {
            return false;
        }

        let remote_policy = &self.policy.strike_engine.remote_policy;
        let ctx = LocationContext {
            user_city: Some(self.policy.location.user_city.clone()).filter(|c| !c.is_empty()),
            user_timezone: Some(self.policy.location.user_timezone),
            relocation_allowed: self.policy.relocation_allowed,
            relocation_penalty: self.policy.relocation_penalty_points,
            max_timezone_diff_hours: remote_policy.max_timezone_diff_hours,
            per_hour_penalty: remote_policy.per_hour_timezone_penalty,
            hard_timezone_penalty: remote_policy.hard_timezone_penalty,
        };

        let job_tz = timezone_offset_for(location);
        let eval = evaluate_location_rules(location, job_tz, is_remote, is_hybrid, &ctx);

        if eval.hard_reject {
            let reason = eval.reason.unwrap_or_else(|| "Location policy failure".to_string());
            result.add_rejection("work_location", "location_policy", reason.clone(), reason);
            return true;
        }

        if eval.strikes > 0 {
            let reason = eval.reason.unwrap_or_else(|| "Location penalty".to_string());
            let name = if is_remote { "timezone_penalty" } else { "relocation_penalty" };
            result.add_strike("work_location", name, reason.clone(), reason, eval.strikes);
        }

        false
    }

    fn check_too_old(&self, posted_date: &str, result: &mut FilterResult) -> bool {
        let reject_days = self.policy.strike_engine.age_strike.reject_days;
        let Some(posted) = parse_job_date(posted_date) else {
            return false;
        };
        let age_days = (chrono::Utc::now() - posted).num_days();
        if age_days > reject_days {
            result.add_rejection(
                "age",
                "job_age",
                format!("Job too old (>{reject_days} days)"),
                format!("Job posted {age_days} days ago"),
            );
            return true;
        }
        false
    }

    // --- Tier 2 checks ---

    fn check_salary_strike(&self, salary: &str, result: &mut FilterResult) {
        if salary.is_empty() {
            return;
        }
        let strike = &self.policy.strike_engine.salary_strike;
        if let Some(max_salary) = parse_salary_string(salary) {
            if max_salary < strike.threshold {
                result.add_strike(
                    "salary",
                    "low_salary",
                    format!("Salary below ${}k", strike.threshold / 1000),
                    format!(
                        "Max salary ${max_salary} is below preferred ${}",
                        strike.threshold
                    ),
                    strike.points,
                );
            }
        }
    }

    /// Only the first matching seniority token counts.
    fn check_seniority_strikes(&self, title: &str, result: &mut FilterResult) {
        let title_lower = title.to_lowercase();
        for (pattern, points) in &self.policy.strike_engine.seniority_strikes {
            if title_lower.contains(&pattern.to_lowercase()) {
                result.add_strike(
                    "seniority",
                    &format!("seniority_{}", pattern.replace(' ', "_")),
                    format!("Seniority: {pattern}"),
                    format!("Title contains '{pattern}' which is not ideal"),
                    *points,
                );
                return;
            }
        }
    }

    /// Word-boundary tech matching; `fail`-ranked tech hard-rejects, while
    /// `strike`-ranked adds points. The token `go` skips "go to market".
    fn check_technology(&self, title: &str, description: &str, result: &mut FilterResult) {
        let combined = format!("{} {}", title, description).to_lowercase();

        let mut strikes_found: Vec<(String, i32)> = Vec::new();
        let mut fails_found: Vec<String> = Vec::new();

        for (tech, entry) in &self.policy.strike_engine.technology_ranks {
            if !matches!(entry.rank, TechRank::Strike | TechRank::Fail) {
                continue;
            }
            let token = tech.to_lowercase();
            let matched = if token == "go" {
                go_language_match(&combined)
            } else {
                word_boundary_match(&token, &combined)
            };
            if !matched {
                continue;
            }
            match entry.rank {
                TechRank::Fail => fails_found.push(tech.clone()),
                TechRank::Strike => strikes_found.push((tech.clone(), entry.points)),
                _ => {}
            }
        }

        for tech in fails_found {
            result.add_rejection(
                "tech_stack",
                "failed_tech",
                format!("Forbidden technology: {tech}"),
                format!("Job requires {tech} which is not acceptable"),
            );
        }
        for (tech, points) in strikes_found {
            result.add_strike(
                "tech_stack",
                "undesired_tech",
                format!("Undesired tech: {tech}"),
                format!("Job requires {tech} which user lacks experience in"),
                points,
            );
        }
    }

    /// Short descriptions and buzzwords. Only the first buzzword counts.
    fn check_quality(&self, description: &str, result: &mut FilterResult) {
        let quality = &self.policy.strike_engine.quality_strikes;
        if !description.is_empty() && description.len() < quality.min_description_length {
            result.add_strike(
                "quality",
                "short_description",
                "Description too short".to_string(),
                format!(
                    "Description is {} chars, prefer {}+",
                    description.len(),
                    quality.min_description_length
                ),
                quality.short_description_points,
            );
        }

        let description_lower = description.to_lowercase();
        for buzzword in &quality.buzzwords {
            if description_lower.contains(&buzzword.to_lowercase()) {
                result.add_strike(
                    "quality",
                    "buzzword",
                    format!("Contains buzzword: {buzzword}"),
                    format!("Description contains '{buzzword}'"),
                    quality.buzzword_points,
                );
                return;
            }
        }
    }

    fn check_age_strike(&self, posted_date: &str, result: &mut FilterResult) {
        let age = &self.policy.strike_engine.age_strike;
        let Some(posted) = parse_job_date(posted_date) else {
            return;
        };
        let age_days = (chrono::Utc::now() - posted).num_days();
        if age_days > age.strike_days {
            result.add_strike(
                "age",
                "job_age",
                format!("Job >{} day(s) old", age.strike_days),
                format!("Job posted {age_days} days ago"),
                age.points,
            );
        }
    }
}

fn word_boundary_match(needle: &str, haystack: &str) -> bool {
    Regex::new(&format!(r"\b{}\b", regex::escape(needle)))
        .map(|re| re.is_match(haystack))
        .unwrap_or(false)
}

/// Word-edge match for tokens that may end in symbols (`c++`, `c#`).
fn token_match(needle: &str, haystack: &str) -> bool {
    let escaped = regex::escape(needle);
    Regex::new(&format!(r"(^|[^\w]){escaped}($|[^\w])"))
        .map(|re| re.is_match(haystack))
        .unwrap_or(false)
}

/// Match the language "go" but not "go to market" / "go-to-market".
fn go_language_match(text: &str) -> bool {
    let re = Regex::new(r"\bgo\b").expect("valid regex");
    let to_follow = Regex::new(r"^[\s-]*to\b").expect("valid regex");
    for m in re.find_iter(text) {
        let after: String = text[m.end()..].chars().take(6).collect();
        if to_follow.is_match(&after) {
            continue;
        }
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsignal_common::policy::*;
    use std::collections::BTreeMap;

    fn policy() -> MatchPolicy {
        let mut tech_ranks = BTreeMap::new();
        tech_ranks.insert(
            "php".to_string(),
            TechRankEntry { rank: TechRank::Strike, points: 2 },
        );
        tech_ranks.insert(
            "cobol".to_string(),
            TechRankEntry { rank: TechRank::Fail, points: 0 },
        );
        tech_ranks.insert(
            "go".to_string(),
            TechRankEntry { rank: TechRank::Strike, points: 1 },
        );

        let mut seniority_strikes = BTreeMap::new();
        seniority_strikes.insert("principal".to_string(), 2);

        MatchPolicy {
            location: LocationScorePolicy {
                user_city: "Portland, OR".to_string(),
                user_timezone: -8.0,
                ..Default::default()
            },
            strike_engine: StrikeEnginePolicy {
                strike_threshold: 5,
                hard_rejections: HardRejectionPolicy {
                    required_title_keywords: vec!["engineer".into(), "developer".into()],
                    excluded_seniority: vec!["intern".into(), "junior".into()],
                    ..Default::default()
                },
                seniority_strikes,
                technology_ranks: tech_ranks,
                quality_strikes: QualityStrikePolicy {
                    buzzwords: vec!["rockstar".into()],
                    ..Default::default()
                },
                ..Default::default()
            },
            stop_list: StopList {
                excluded_companies: vec!["Shady Corp".into()],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn engine() -> StrikeEngine {
        StrikeEngine::new(policy())
    }

    fn fresh_remote_posting(title: &str) -> Posting {
        let mut p = Posting::new(title, "https://x.test/1");
        p.description = format!(
            "Fully remote role. {}",
            "We build infrastructure for the modern web with strong engineering culture. "
                .repeat(4)
        );
        p.posted_date = Some(chrono::Utc::now().to_rfc3339());
        p
    }

    #[test]
    fn clean_posting_passes() {
        let result = engine().evaluate(&fresh_remote_posting("Senior Software Engineer"));
        assert!(result.passed, "{:?}", result.strikes);
        assert_eq!(result.total_strikes, 0);
    }

    #[test]
    fn missing_required_title_keyword_hard_rejects() {
        let result = engine().evaluate(&fresh_remote_posting("Account Executive"));
        assert!(!result.passed);
        assert_eq!(
            result.hard_rejections().next().unwrap().name,
            "missing_required_title_keyword"
        );
    }

    #[test]
    fn intern_title_hard_rejects() {
        let result = engine().evaluate(&fresh_remote_posting("Software Engineer Intern"));
        assert!(!result.passed);
        assert_eq!(result.hard_rejections().next().unwrap().name, "excluded_seniority");
    }

    #[test]
    fn internal_is_not_intern() {
        let result = engine().evaluate(&fresh_remote_posting("Internal Tools Engineer"));
        assert!(result.passed, "{:?}", result.strikes);
    }

    #[test]
    fn commission_only_hard_rejects() {
        let mut p = fresh_remote_posting("Sales Engineer");
        p.description = "Commission only role, be your own boss!".to_string();
        let result = engine().evaluate(&p);
        assert!(!result.passed);
        assert_eq!(result.hard_rejections().next().unwrap().name, "commission_only");
    }

    #[test]
    fn onsite_outside_city_hard_rejects_with_work_location_strike_category() {
        let mut p = fresh_remote_posting("Senior Engineer");
        p.description = "Great office culture.".to_string();
        p.location = "New York, NY (On-site)".to_string();
        let result = engine().evaluate(&p);
        assert!(!result.passed);
        let hard = result.hard_rejections().next().unwrap();
        assert_eq!(hard.name, "location_policy");
    }

    #[test]
    fn old_posting_hard_rejects() {
        let mut p = fresh_remote_posting("Senior Engineer");
        p.posted_date = Some((chrono::Utc::now() - chrono::Duration::days(10)).to_rfc3339());
        let result = engine().evaluate(&p);
        assert!(!result.passed);
        assert_eq!(result.hard_rejections().next().unwrap().name, "job_age");
    }

    #[test]
    fn strikes_accumulate_to_failure() {
        let mut p = fresh_remote_posting("Principal Engineer");
        p.salary = Some("$120k".to_string());
        p.description = format!("{} Uses PHP daily. Rockstar wanted.", p.description);
        // principal (2) + low salary (2) + php (2) + rockstar (1) = 7 >= 5
        let result = engine().evaluate(&p);
        assert!(!result.passed);
        assert!(result.total_strikes >= result.strike_threshold);
        assert!(result.hard_rejections().next().is_none(), "no hard rejects");
    }

    #[test]
    fn failed_tech_hard_rejects() {
        let mut p = fresh_remote_posting("Senior Engineer");
        p.description = format!("{} Maintain our COBOL estate.", p.description);
        let result = engine().evaluate(&p);
        assert!(!result.passed);
        assert_eq!(result.hard_rejections().next().unwrap().name, "failed_tech");
    }

    #[test]
    fn go_to_market_does_not_count_as_go() {
        let mut p = fresh_remote_posting("Senior Engineer");
        p.description = format!("{} Own the go to market strategy.", p.description);
        let result = engine().evaluate(&p);
        assert!(
            !result.strikes.iter().any(|s| s.name == "undesired_tech"),
            "{:?}",
            result.strikes
        );

        let mut p = fresh_remote_posting("Senior Engineer");
        p.description = format!("{} Services written in Go.", p.description);
        let result = engine().evaluate(&p);
        assert!(result.strikes.iter().any(|s| s.name == "undesired_tech"));
    }

    #[test]
    fn stop_list_company_takes_strikes() {
        let mut p = fresh_remote_posting("Senior Engineer");
        p.company = "Shady Corp International".to_string();
        let result = engine().evaluate(&p);
        assert!(result.strikes.iter().any(|s| s.category == "stop_list"));
    }

    #[test]
    fn short_description_strike() {
        let mut p = fresh_remote_posting("Senior Engineer");
        p.description = "Remote role.".to_string();
        let result = engine().evaluate(&p);
        assert!(result.strikes.iter().any(|s| s.name == "short_description"));
    }

    #[test]
    fn age_strike_for_day_old_postings() {
        let mut p = fresh_remote_posting("Senior Engineer");
        p.posted_date = Some((chrono::Utc::now() - chrono::Duration::days(3)).to_rfc3339());
        let result = engine().evaluate(&p);
        assert!(result.strikes.iter().any(|s| s.name == "job_age" && s.severity == "strike"));
    }

    #[test]
    fn disabled_engine_passes_everything() {
        let mut pol = policy();
        pol.strike_engine.enabled = false;
        let result = StrikeEngine::new(pol).evaluate(&fresh_remote_posting("Account Executive"));
        assert!(result.passed);
    }
}
