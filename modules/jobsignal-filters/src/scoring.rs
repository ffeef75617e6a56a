//! Deterministic 0-100 match scoring. No AI involved: every adjustment is
//! config-driven and recorded in the breakdown.

use jobsignal_common::{Company, MatchPolicy};
use regex::Regex;
use serde::{Deserialize, Serialize};

const BASE_SCORE: i32 = 50;

/// Structured facts about a job, extracted upstream (AI-assisted or
/// heuristic). The scoring engine itself never reads raw text except for
/// skill matching.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobExtraction {
    pub seniority: Option<String>,
    /// "remote" | "hybrid" | "onsite"
    pub work_arrangement: Option<String>,
    /// Job-side UTC offset in hours.
    pub timezone: Option<f64>,
    pub city: Option<String>,
    #[serde(default)]
    pub relocation_required: bool,
    #[serde(default)]
    pub technologies: Vec<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    #[serde(default)]
    pub includes_equity: bool,
    #[serde(default)]
    pub is_contract: bool,
    pub experience_min: Option<i32>,
    pub experience_max: Option<i32>,
    pub days_old: Option<i64>,
    #[serde(default)]
    pub is_repost: bool,
    #[serde(default)]
    pub requires_clearance: bool,
    #[serde(default)]
    pub is_backend: bool,
    #[serde(default)]
    pub is_ml_ai: bool,
    #[serde(default)]
    pub is_devops_sre: bool,
    #[serde(default)]
    pub is_data: bool,
    #[serde(default)]
    pub is_security: bool,
    #[serde(default)]
    pub is_lead: bool,
    #[serde(default)]
    pub is_frontend: bool,
    #[serde(default)]
    pub is_fullstack: bool,
    #[serde(default)]
    pub is_consulting: bool,
    #[serde(default)]
    pub is_management: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreAdjustment {
    pub category: String,
    pub reason: String,
    pub points: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub base_score: i32,
    pub final_score: i32,
    pub adjustments: Vec<ScoreAdjustment>,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl ScoreBreakdown {
    fn rejected(adjustments: Vec<ScoreAdjustment>, reason: String) -> Self {
        Self {
            base_score: BASE_SCORE,
            final_score: 0,
            adjustments,
            passed: false,
            rejection_reason: Some(reason),
        }
    }
}

struct CategoryResult {
    points: i32,
    adjustments: Vec<ScoreAdjustment>,
    hard_reject: Option<String>,
}

impl CategoryResult {
    fn neutral() -> Self {
        Self {
            points: 0,
            adjustments: Vec::new(),
            hard_reject: None,
        }
    }

    fn single(category: &str, reason: String, points: i32) -> Self {
        Self {
            points,
            adjustments: vec![ScoreAdjustment {
                category: category.to_string(),
                reason,
                points,
            }],
            hard_reject: None,
        }
    }

    fn reject(reason: String) -> Self {
        Self {
            points: 0,
            adjustments: Vec::new(),
            hard_reject: Some(reason),
        }
    }
}

pub struct ScoringEngine {
    policy: MatchPolicy,
    user_skills: Vec<String>,
}

impl ScoringEngine {
    pub fn new(policy: MatchPolicy) -> Self {
        let user_skills = policy
            .user_skills
            .iter()
            .map(|s| s.to_lowercase().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            policy,
            user_skills,
        }
    }

    pub fn score(
        &self,
        extraction: &JobExtraction,
        job_description: &str,
        company: Option<&Company>,
    ) -> ScoreBreakdown {
        let mut score = BASE_SCORE;
        let mut adjustments: Vec<ScoreAdjustment> = Vec::new();

        let mut apply =
            |score: &mut i32, adjustments: &mut Vec<ScoreAdjustment>, result: CategoryResult| {
                *score += result.points;
                adjustments.extend(result.adjustments);
                result.hard_reject
            };

        // 1. Seniority
        let result = self.score_seniority(extraction.seniority.as_deref());
        if let Some(reason) = apply(&mut score, &mut adjustments, result) {
            return ScoreBreakdown::rejected(adjustments, reason);
        }

        // 2. Location / work arrangement
        let result = self.score_location(extraction);
        if let Some(reason) = apply(&mut score, &mut adjustments, result) {
            return ScoreBreakdown::rejected(adjustments, reason);
        }

        // 3. Technology
        let result = self.score_technology(&extraction.technologies);
        if let Some(reason) = apply(&mut score, &mut adjustments, result) {
            return ScoreBreakdown::rejected(adjustments, reason);
        }

        // 4. Salary
        let result = self.score_salary(extraction);
        if let Some(reason) = apply(&mut score, &mut adjustments, result) {
            return ScoreBreakdown::rejected(adjustments, reason);
        }

        // 5. Experience
        let result = self.score_experience(extraction.experience_min, extraction.experience_max);
        apply(&mut score, &mut adjustments, result);

        // 6. Skill match
        let result = self.score_skills(job_description);
        apply(&mut score, &mut adjustments, result);

        // 7. Freshness
        let result = self.score_freshness(extraction);
        apply(&mut score, &mut adjustments, result);

        // 8. Role fit
        let result = self.score_role_fit(extraction);
        if let Some(reason) = apply(&mut score, &mut adjustments, result) {
            return ScoreBreakdown::rejected(adjustments, reason);
        }

        // 9. Company signals
        if let Some(company) = company {
            let result = self.score_company_signals(company);
            apply(&mut score, &mut adjustments, result);
        }

        let final_score = score.clamp(0, 100);
        let passed = final_score >= self.policy.min_score;
        ScoreBreakdown {
            base_score: BASE_SCORE,
            final_score,
            adjustments,
            passed,
            rejection_reason: (!passed).then(|| {
                format!(
                    "Score {final_score} below threshold {}",
                    self.policy.min_score
                )
            }),
        }
    }

    fn score_seniority(&self, seniority: Option<&str>) -> CategoryResult {
        let Some(seniority) = seniority.filter(|s| !s.is_empty() && *s != "unknown") else {
            return CategoryResult::neutral();
        };
        let lower = seniority.to_lowercase();
        let cfg = &self.policy.seniority;

        if cfg.rejected.iter().any(|s| s.to_lowercase() == lower) {
            let mut result = CategoryResult::reject(format!("Rejected seniority level: {seniority}"));
            result.adjustments.push(ScoreAdjustment {
                category: "seniority".to_string(),
                reason: format!("Rejected seniority '{seniority}'"),
                points: cfg.rejected_penalty,
            });
            return result;
        }
        if cfg.preferred.iter().any(|s| s.to_lowercase() == lower) {
            return CategoryResult::single(
                "seniority",
                format!("Preferred seniority '{seniority}'"),
                cfg.preferred_bonus,
            );
        }
        if cfg.acceptable.iter().any(|s| s.to_lowercase() == lower) {
            if cfg.acceptable_penalty != 0 {
                return CategoryResult::single(
                    "seniority",
                    format!("Acceptable seniority '{seniority}'"),
                    cfg.acceptable_penalty,
                );
            }
            return CategoryResult::neutral();
        }
        CategoryResult::neutral()
    }

    fn score_location(&self, extraction: &JobExtraction) -> CategoryResult {
        let cfg = &self.policy.location;

        if extraction.relocation_required {
            if cfg.relocation_penalty <= -100 {
                return CategoryResult::reject("Relocation required".to_string());
            }
            let mut result = self.score_timezone(extraction, false);
            if result.hard_reject.is_some() {
                return result;
            }
            result.points += cfg.relocation_penalty;
            result.adjustments.push(ScoreAdjustment {
                category: "location".to_string(),
                reason: "Relocation required".to_string(),
                points: cfg.relocation_penalty,
            });
            return result;
        }

        match extraction.work_arrangement.as_deref() {
            Some("remote") => {
                if !cfg.allow_remote {
                    return CategoryResult::reject("Remote work not allowed per config".to_string());
                }
                CategoryResult::single("location", "Remote position".to_string(), cfg.remote_bonus)
            }
            Some("hybrid") => {
                if !cfg.allow_hybrid {
                    return CategoryResult::reject("Hybrid work not allowed per config".to_string());
                }
                self.score_timezone(extraction, true)
            }
            Some("onsite") => {
                if !cfg.allow_onsite {
                    return CategoryResult::reject("Onsite work not allowed per config".to_string());
                }
                self.score_timezone(extraction, false)
            }
            _ => CategoryResult::neutral(),
        }
    }

    fn score_timezone(&self, extraction: &JobExtraction, is_hybrid: bool) -> CategoryResult {
        let cfg = &self.policy.location;

        let Some(job_tz) = extraction.timezone else {
            return CategoryResult::single("location", "Unknown timezone".to_string(), -5);
        };

        let tz_diff = (job_tz - cfg.user_timezone).abs();
        if tz_diff > cfg.max_timezone_diff_hours {
            return CategoryResult::reject(format!(
                "Timezone difference {tz_diff}h exceeds max {}h",
                cfg.max_timezone_diff_hours
            ));
        }

        let penalty = -((tz_diff * cfg.per_hour_penalty as f64) as i32);
        let mut result = CategoryResult::neutral();

        if is_hybrid {
            if let Some(city) = extraction.city.as_deref() {
                if !cfg.user_city.is_empty() && city.to_lowercase() == cfg.user_city.to_lowercase()
                {
                    result.points += cfg.hybrid_same_city_bonus;
                    result.adjustments.push(ScoreAdjustment {
                        category: "location".to_string(),
                        reason: "Hybrid in same city".to_string(),
                        points: cfg.hybrid_same_city_bonus,
                    });
                }
            }
        }

        if penalty != 0 {
            result.points += penalty;
            result.adjustments.push(ScoreAdjustment {
                category: "location".to_string(),
                reason: format!("Timezone diff {tz_diff}h"),
                points: penalty,
            });
        }

        result
    }

    fn score_technology(&self, technologies: &[String]) -> CategoryResult {
        if technologies.is_empty() {
            return CategoryResult::neutral();
        }
        let cfg = &self.policy.technology;
        let tech_set: Vec<String> = technologies.iter().map(|t| t.to_lowercase()).collect();
        let contains = |list: &[String], t: &str| list.iter().any(|x| x.to_lowercase() == t);

        let rejected_found: Vec<&String> = tech_set
            .iter()
            .filter(|t| contains(&cfg.rejected, t))
            .collect();
        if !rejected_found.is_empty() {
            let names = rejected_found
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return CategoryResult::reject(format!("Rejected technology detected: {names}"));
        }

        let mut result = CategoryResult::neutral();

        let required_found: Vec<&String> = tech_set
            .iter()
            .filter(|t| contains(&cfg.required, t))
            .collect();
        if !required_found.is_empty() {
            let bonus = required_found.len() as i32 * cfg.required_bonus;
            result.points += bonus;
            result.adjustments.push(ScoreAdjustment {
                category: "technology".to_string(),
                reason: format!(
                    "Required tech matched: {}",
                    required_found
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                points: bonus,
            });
        } else if !cfg.required.is_empty() {
            result.points += cfg.missing_required_penalty;
            result.adjustments.push(ScoreAdjustment {
                category: "technology".to_string(),
                reason: format!("Missing required tech: {}", cfg.required.join(", ")),
                points: cfg.missing_required_penalty,
            });
        }

        let preferred_found: Vec<&String> = tech_set
            .iter()
            .filter(|t| contains(&cfg.preferred, t))
            .collect();
        if !preferred_found.is_empty() {
            let bonus = preferred_found.len() as i32 * cfg.preferred_bonus;
            result.points += bonus;
            result.adjustments.push(ScoreAdjustment {
                category: "technology".to_string(),
                reason: format!(
                    "Preferred tech: {}",
                    preferred_found
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                points: bonus,
            });
        }

        let disliked_found: Vec<&String> = tech_set
            .iter()
            .filter(|t| contains(&cfg.disliked, t))
            .collect();
        if !disliked_found.is_empty() {
            let penalty = disliked_found.len() as i32 * cfg.disliked_penalty;
            result.points += penalty;
            result.adjustments.push(ScoreAdjustment {
                category: "technology".to_string(),
                reason: format!(
                    "Disliked tech: {}",
                    disliked_found
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                points: penalty,
            });
        }

        result
    }

    fn score_salary(&self, extraction: &JobExtraction) -> CategoryResult {
        let cfg = &self.policy.salary;
        let job_salary = extraction.salary_max.or(extraction.salary_min);
        let mut result = CategoryResult::neutral();

        match job_salary {
            None => {
                result.points += cfg.no_salary_penalty;
                result.adjustments.push(ScoreAdjustment {
                    category: "salary".to_string(),
                    reason: "No salary info".to_string(),
                    points: cfg.no_salary_penalty,
                });
            }
            Some(salary) => {
                if let Some(minimum) = cfg.minimum {
                    if salary < minimum {
                        return CategoryResult::reject(format!(
                            "Salary below minimum: ${salary}"
                        ));
                    }
                }
                if let Some(target) = cfg.target {
                    if salary < target {
                        let diff = target - salary;
                        let penalty_units = diff / 10_000;
                        let penalty =
                            (-(penalty_units as i32 * cfg.below_target_penalty)).max(-20);
                        result.points += penalty;
                        result.adjustments.push(ScoreAdjustment {
                            category: "salary".to_string(),
                            reason: format!("Salary ${salary} below target ${target}"),
                            points: penalty,
                        });
                    } else {
                        result.points += cfg.meets_target_bonus;
                        result.adjustments.push(ScoreAdjustment {
                            category: "salary".to_string(),
                            reason: format!("Salary ${salary} meets target"),
                            points: cfg.meets_target_bonus,
                        });
                    }
                }
            }
        }

        if extraction.includes_equity && cfg.equity_bonus != 0 {
            result.points += cfg.equity_bonus;
            result.adjustments.push(ScoreAdjustment {
                category: "salary".to_string(),
                reason: "Includes equity".to_string(),
                points: cfg.equity_bonus,
            });
        }
        if extraction.is_contract && cfg.contract_penalty != 0 {
            result.points += cfg.contract_penalty;
            result.adjustments.push(ScoreAdjustment {
                category: "salary".to_string(),
                reason: "Contract position".to_string(),
                points: cfg.contract_penalty,
            });
        }

        result
    }

    fn score_experience(&self, min_exp: Option<i32>, max_exp: Option<i32>) -> CategoryResult {
        let cfg = &self.policy.experience;
        if min_exp.is_none() && max_exp.is_none() {
            return CategoryResult::neutral();
        }

        let job_min = min_exp.unwrap_or(0);
        let job_max = max_exp.unwrap_or(job_min);
        let user_years = cfg.user_years;

        if job_min > user_years {
            let diff = job_min - user_years;
            if diff > 3 {
                return CategoryResult::single(
                    "experience",
                    format!("Requires {job_min}+ years, user has {user_years}"),
                    -30,
                );
            }
            return CategoryResult::single(
                "experience",
                format!("Requires {job_min}+ years, user has {user_years}"),
                -diff * 5,
            );
        }

        if job_min > cfg.max_required {
            return CategoryResult::single(
                "experience",
                format!(
                    "Requires {job_min}+ years (exceeds {} threshold)",
                    cfg.max_required
                ),
                -10,
            );
        }

        if job_max > 0 && user_years > job_max + 3 {
            let over_years = user_years - job_max;
            let penalty = -(over_years * cfg.overqualified_penalty).min(15);
            return CategoryResult::single(
                "experience",
                format!("User overqualified ({user_years}y vs {job_max}y max)"),
                penalty,
            );
        }

        CategoryResult::single(
            "experience",
            format!("Experience match ({job_min}-{job_max}y required)"),
            5,
        )
    }

    /// Word-boundary count of user skills in the description, capped.
    fn score_skills(&self, description: &str) -> CategoryResult {
        if self.user_skills.is_empty() || description.is_empty() {
            return CategoryResult::neutral();
        }

        let desc_lower = description.to_lowercase();
        let matched = self
            .user_skills
            .iter()
            .filter(|skill| {
                Regex::new(&format!(r"\b{}\b", regex::escape(skill)))
                    .map(|re| re.is_match(&desc_lower))
                    .unwrap_or(false)
            })
            .count();

        if matched == 0 {
            return CategoryResult::neutral();
        }
        let bonus = ((matched as i32) * 2).min(15);
        CategoryResult::single("skills", format!("Matched {matched} user skills"), bonus)
    }

    fn score_freshness(&self, extraction: &JobExtraction) -> CategoryResult {
        let cfg = &self.policy.freshness;
        let Some(days_old) = extraction.days_old else {
            return CategoryResult::neutral();
        };

        let mut result = CategoryResult::neutral();
        if days_old <= cfg.fresh_bonus_days {
            result.points += cfg.fresh_bonus;
            result.adjustments.push(ScoreAdjustment {
                category: "freshness".to_string(),
                reason: format!("Fresh job ({days_old}d old)"),
                points: cfg.fresh_bonus,
            });
        } else if days_old >= cfg.very_stale_days {
            result.points += cfg.very_stale_penalty;
            result.adjustments.push(ScoreAdjustment {
                category: "freshness".to_string(),
                reason: format!("Very stale job ({days_old}d old)"),
                points: cfg.very_stale_penalty,
            });
        } else if days_old >= cfg.stale_threshold_days {
            result.points += cfg.stale_penalty;
            result.adjustments.push(ScoreAdjustment {
                category: "freshness".to_string(),
                reason: format!("Stale job ({days_old}d old)"),
                points: cfg.stale_penalty,
            });
        }

        if extraction.is_repost {
            result.points += cfg.repost_penalty;
            result.adjustments.push(ScoreAdjustment {
                category: "freshness".to_string(),
                reason: "Reposted job".to_string(),
                points: cfg.repost_penalty,
            });
        }

        result
    }

    fn score_role_fit(&self, extraction: &JobExtraction) -> CategoryResult {
        let cfg = &self.policy.role_fit;
        let mut result = CategoryResult::neutral();

        if extraction.requires_clearance {
            if cfg.clearance_penalty <= -100 {
                let mut reject =
                    CategoryResult::reject("Security clearance required".to_string());
                reject.adjustments.push(ScoreAdjustment {
                    category: "role_fit".to_string(),
                    reason: "Security clearance required".to_string(),
                    points: cfg.clearance_penalty,
                });
                return reject;
            }
            result.points += cfg.clearance_penalty;
            result.adjustments.push(ScoreAdjustment {
                category: "role_fit".to_string(),
                reason: "Clearance required".to_string(),
                points: cfg.clearance_penalty,
            });
        }

        let mut add = |cond: bool, reason: &str, points: i32| {
            if cond && points != 0 {
                result.points += points;
                result.adjustments.push(ScoreAdjustment {
                    category: "role_fit".to_string(),
                    reason: reason.to_string(),
                    points,
                });
            }
        };

        add(extraction.is_backend, "Backend role", cfg.backend_bonus);
        add(extraction.is_ml_ai, "ML/AI role", cfg.ml_ai_bonus);
        add(extraction.is_devops_sre, "DevOps/SRE role", cfg.devops_sre_bonus);
        add(extraction.is_data, "Data engineering role", cfg.data_bonus);
        add(extraction.is_security, "Security role", cfg.security_bonus);
        add(extraction.is_lead, "Technical lead role", cfg.lead_bonus);
        add(
            extraction.is_frontend && !extraction.is_fullstack,
            "Frontend-only role",
            cfg.frontend_penalty,
        );
        add(extraction.is_consulting, "Consulting role", cfg.consulting_penalty);
        add(extraction.is_management, "Management role", cfg.management_penalty);

        result
    }

    fn score_company_signals(&self, company: &Company) -> CategoryResult {
        let cfg = &self.policy.company;
        let mut result = CategoryResult::neutral();

        let about = company.about.as_deref().unwrap_or_default().to_lowercase();
        let headquarters = company
            .headquarters
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();

        let preferred_city = cfg.preferred_city.to_lowercase();
        if cfg.preferred_city_bonus != 0
            && !preferred_city.is_empty()
            && headquarters.contains(&preferred_city)
        {
            result.points += cfg.preferred_city_bonus;
            result.adjustments.push(ScoreAdjustment {
                category: "company".to_string(),
                reason: format!("{} office", cfg.preferred_city),
                points: cfg.preferred_city_bonus,
            });
        }

        if cfg.remote_first_bonus != 0 && company.is_remote_first {
            result.points += cfg.remote_first_bonus;
            result.adjustments.push(ScoreAdjustment {
                category: "company".to_string(),
                reason: "Remote-first company".to_string(),
                points: cfg.remote_first_bonus,
            });
        }

        if cfg.ai_ml_focus_bonus != 0 {
            let ai_keywords = [
                "machine learning",
                "artificial intelligence",
                " ai ",
                " ml ",
                "deep learning",
                "llm",
                "generative ai",
            ];
            let stack_hits = company.tech_stack.iter().any(|t| {
                let t = t.to_lowercase();
                ["pytorch", "tensorflow", "ml", "ai"].iter().any(|kw| t.contains(kw))
            });
            if ai_keywords.iter().any(|kw| about.contains(kw)) || stack_hits {
                result.points += cfg.ai_ml_focus_bonus;
                result.adjustments.push(ScoreAdjustment {
                    category: "company".to_string(),
                    reason: "AI/ML focus".to_string(),
                    points: cfg.ai_ml_focus_bonus,
                });
            }
        }

        if let Some(employee_count) = company.employee_count {
            if employee_count >= cfg.large_company_threshold && cfg.large_company_bonus != 0 {
                result.points += cfg.large_company_bonus;
                result.adjustments.push(ScoreAdjustment {
                    category: "company".to_string(),
                    reason: "Large company".to_string(),
                    points: cfg.large_company_bonus,
                });
            } else if employee_count <= cfg.small_company_threshold {
                if cfg.startup_bonus != 0 {
                    result.points += cfg.startup_bonus;
                    result.adjustments.push(ScoreAdjustment {
                        category: "company".to_string(),
                        reason: "Startup".to_string(),
                        points: cfg.startup_bonus,
                    });
                } else if cfg.small_company_penalty != 0 {
                    result.points += cfg.small_company_penalty;
                    result.adjustments.push(ScoreAdjustment {
                        category: "company".to_string(),
                        reason: "Small company".to_string(),
                        points: cfg.small_company_penalty,
                    });
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jobsignal_common::policy::*;
    use uuid::Uuid;

    fn policy() -> MatchPolicy {
        MatchPolicy {
            min_score: 50,
            salary: SalaryScorePolicy {
                minimum: Some(100_000),
                target: Some(160_000),
                ..Default::default()
            },
            technology: TechnologyScorePolicy {
                required: vec!["rust".into()],
                preferred: vec!["postgres".into()],
                disliked: vec!["php".into()],
                rejected: vec!["cobol".into()],
                ..Default::default()
            },
            experience: ExperiencePolicy {
                user_years: 8,
                ..Default::default()
            },
            user_skills: vec!["rust".into(), "kubernetes".into()],
            ..Default::default()
        }
    }

    fn engine() -> ScoringEngine {
        ScoringEngine::new(policy())
    }

    fn good_extraction() -> JobExtraction {
        JobExtraction {
            seniority: Some("senior".to_string()),
            work_arrangement: Some("remote".to_string()),
            technologies: vec!["rust".to_string(), "postgres".to_string()],
            salary_min: Some(150_000),
            salary_max: Some(180_000),
            experience_min: Some(5),
            experience_max: Some(8),
            days_old: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn strong_match_scores_high_and_passes() {
        let breakdown = engine().score(
            &good_extraction(),
            "We use Rust and Kubernetes in production.",
            None,
        );
        assert!(breakdown.passed, "{breakdown:?}");
        assert!(breakdown.final_score > 70, "{}", breakdown.final_score);
        assert_eq!(breakdown.base_score, 50);
        assert!(breakdown.rejection_reason.is_none());
    }

    #[test]
    fn rejected_seniority_hard_rejects() {
        let mut extraction = good_extraction();
        extraction.seniority = Some("intern".to_string());
        let breakdown = engine().score(&extraction, "", None);
        assert!(!breakdown.passed);
        assert_eq!(breakdown.final_score, 0);
        assert!(breakdown.rejection_reason.unwrap().contains("seniority"));
    }

    #[test]
    fn disallowed_onsite_hard_rejects() {
        let mut extraction = good_extraction();
        extraction.work_arrangement = Some("onsite".to_string());
        let breakdown = engine().score(&extraction, "", None);
        assert!(!breakdown.passed);
        assert!(breakdown.rejection_reason.unwrap().contains("Onsite"));
    }

    #[test]
    fn timezone_beyond_max_hard_rejects() {
        let mut extraction = good_extraction();
        extraction.work_arrangement = Some("hybrid".to_string());
        extraction.timezone = Some(1.0); // vs default user -8, max diff 4
        let breakdown = engine().score(&extraction, "", None);
        assert!(!breakdown.passed);
        assert!(breakdown.rejection_reason.unwrap().contains("Timezone"));
    }

    #[test]
    fn hybrid_same_city_bonus_applies() {
        let mut pol = policy();
        pol.location.user_city = "Portland".to_string();
        let mut extraction = good_extraction();
        extraction.work_arrangement = Some("hybrid".to_string());
        extraction.timezone = Some(-8.0);
        extraction.city = Some("Portland".to_string());
        let breakdown = ScoringEngine::new(pol).score(&extraction, "", None);
        assert!(breakdown
            .adjustments
            .iter()
            .any(|a| a.reason == "Hybrid in same city"));
    }

    #[test]
    fn rejected_technology_hard_rejects() {
        let mut extraction = good_extraction();
        extraction.technologies.push("cobol".to_string());
        let breakdown = engine().score(&extraction, "", None);
        assert!(!breakdown.passed);
        assert!(breakdown.rejection_reason.unwrap().contains("cobol"));
    }

    #[test]
    fn salary_below_minimum_hard_rejects() {
        let mut extraction = good_extraction();
        extraction.salary_min = Some(80_000);
        extraction.salary_max = Some(90_000);
        let breakdown = engine().score(&extraction, "", None);
        assert!(!breakdown.passed);
        assert!(breakdown.rejection_reason.unwrap().contains("Salary"));
    }

    #[test]
    fn below_target_penalty_scales_and_caps() {
        let mut extraction = good_extraction();
        extraction.salary_max = Some(120_000); // $40k below target => 4 * 2 = 8
        let breakdown = engine().score(&extraction, "", None);
        let salary_adj = breakdown
            .adjustments
            .iter()
            .find(|a| a.reason.contains("below target"))
            .unwrap();
        assert_eq!(salary_adj.points, -8);

        extraction.salary_max = Some(101_000); // way below target, capped
        let breakdown = engine().score(&extraction, "", None);
        let salary_adj = breakdown
            .adjustments
            .iter()
            .find(|a| a.reason.contains("below target"))
            .unwrap();
        assert_eq!(salary_adj.points, -10, "5 units * 2 points");
    }

    #[test]
    fn severely_underqualified_takes_soft_penalty() {
        let mut extraction = good_extraction();
        extraction.experience_min = Some(15);
        extraction.experience_max = None;
        let breakdown = engine().score(&extraction, "", None);
        let exp_adj = breakdown
            .adjustments
            .iter()
            .find(|a| a.category == "experience")
            .unwrap();
        assert_eq!(exp_adj.points, -30);
    }

    #[test]
    fn clearance_requirement_hard_rejects_by_default() {
        let mut extraction = good_extraction();
        extraction.requires_clearance = true;
        let breakdown = engine().score(&extraction, "", None);
        assert!(!breakdown.passed);
        assert!(breakdown.rejection_reason.unwrap().contains("clearance"));
    }

    #[test]
    fn skill_match_counts_word_boundaries() {
        let extraction = good_extraction();
        let breakdown = engine().score(
            &extraction,
            "You will write rust services and run kubernetes clusters.",
            None,
        );
        let skills = breakdown
            .adjustments
            .iter()
            .find(|a| a.category == "skills")
            .unwrap();
        assert_eq!(skills.points, 4, "two skills at 2 points each");
    }

    #[test]
    fn company_signals_contribute() {
        let company = Company {
            id: Uuid::new_v4(),
            name: "Acme".to_string(),
            website: None,
            about: Some("We build machine learning infrastructure".to_string()),
            culture: None,
            mission: None,
            headquarters: Some("Portland, OR".to_string()),
            employee_count: Some(2_000),
            tech_stack: vec!["pytorch".to_string()],
            is_remote_first: true,
            industry: None,
            tier: None,
            priority_score: None,
            data_quality: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let breakdown = engine().score(&good_extraction(), "", Some(&company));
        assert!(breakdown
            .adjustments
            .iter()
            .any(|a| a.reason == "Remote-first company"));
        assert!(breakdown
            .adjustments
            .iter()
            .any(|a| a.reason == "AI/ML focus"));
    }

    #[test]
    fn final_score_clamped_to_range() {
        let mut extraction = good_extraction();
        extraction.is_contract = true;
        extraction.is_consulting = true;
        extraction.is_management = true;
        extraction.is_frontend = true;
        extraction.salary_max = Some(100_000);
        extraction.days_old = Some(60);
        extraction.is_repost = true;
        extraction.technologies = vec!["php".to_string()];
        let breakdown = engine().score(&extraction, "", None);
        assert!(breakdown.final_score >= 0 && breakdown.final_score <= 100);
    }
}
