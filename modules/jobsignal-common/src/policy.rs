//! Configuration documents recognized by the core.
//!
//! Three documents drive filtering and scoring: `prefilter-policy`,
//! `match-policy`, and `scraping-settings`. They arrive as JSON from an
//! opaque config store; missing required documents fail fast at startup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::JobSignalError;

// --- prefilter-policy ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TitlePolicy {
    pub required_keywords: Vec<String>,
    pub excluded_keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FreshnessPolicy {
    /// 0 disables the freshness check.
    pub max_age_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkArrangementPolicy {
    pub allow_remote: bool,
    pub allow_hybrid: bool,
    pub allow_onsite: bool,
    pub will_relocate: bool,
    pub user_location: Option<String>,
    pub remote_keywords: Vec<String>,
    pub treat_unknown_as_onsite: bool,
    pub max_timezone_diff_hours: Option<f64>,
}

impl Default for WorkArrangementPolicy {
    fn default() -> Self {
        Self {
            allow_remote: true,
            allow_hybrid: true,
            allow_onsite: true,
            will_relocate: false,
            user_location: None,
            remote_keywords: default_remote_keywords(),
            treat_unknown_as_onsite: false,
            max_timezone_diff_hours: None,
        }
    }
}

pub fn default_remote_keywords() -> Vec<String> {
    [
        "remote",
        "fully remote",
        "100% remote",
        "work from home",
        "work from anywhere",
        "wfh",
        "remote-first",
        "remote friendly",
        "remote-friendly",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmploymentTypePolicy {
    pub allow_full_time: bool,
    pub allow_part_time: bool,
    pub allow_contract: bool,
}

impl Default for EmploymentTypePolicy {
    fn default() -> Self {
        Self {
            allow_full_time: true,
            allow_part_time: true,
            allow_contract: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SalaryFloorPolicy {
    pub minimum: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TechnologyRejectPolicy {
    pub rejected: Vec<String>,
}

/// The cheap structured pre-filter policy. Missing data always passes;
/// only explicit evidence rejects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrefilterPolicy {
    pub title: TitlePolicy,
    pub freshness: FreshnessPolicy,
    pub work_arrangement: WorkArrangementPolicy,
    pub employment_type: EmploymentTypePolicy,
    pub salary: SalaryFloorPolicy,
    pub technology: TechnologyRejectPolicy,
}

// --- match-policy ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeniorityPolicy {
    pub preferred: Vec<String>,
    pub acceptable: Vec<String>,
    pub rejected: Vec<String>,
    pub preferred_bonus: i32,
    pub acceptable_penalty: i32,
    pub rejected_penalty: i32,
}

impl Default for SeniorityPolicy {
    fn default() -> Self {
        Self {
            preferred: vec!["senior".into(), "staff".into()],
            acceptable: vec!["mid-level".into(), "lead".into()],
            rejected: vec!["intern".into(), "junior".into(), "entry-level".into()],
            preferred_bonus: 15,
            acceptable_penalty: 0,
            rejected_penalty: -100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationScorePolicy {
    pub allow_remote: bool,
    pub allow_hybrid: bool,
    pub allow_onsite: bool,
    /// UTC offset in hours.
    pub user_timezone: f64,
    pub max_timezone_diff_hours: f64,
    pub per_hour_penalty: i32,
    pub user_city: String,
    pub hybrid_same_city_bonus: i32,
    pub remote_bonus: i32,
    /// <= -100 turns a required relocation into a hard reject.
    pub relocation_penalty: i32,
}

impl Default for LocationScorePolicy {
    fn default() -> Self {
        Self {
            allow_remote: true,
            allow_hybrid: true,
            allow_onsite: false,
            user_timezone: -8.0,
            max_timezone_diff_hours: 4.0,
            per_hour_penalty: 3,
            user_city: String::new(),
            hybrid_same_city_bonus: 10,
            remote_bonus: 5,
            relocation_penalty: -50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TechnologyScorePolicy {
    pub required: Vec<String>,
    pub preferred: Vec<String>,
    pub disliked: Vec<String>,
    pub rejected: Vec<String>,
    pub required_bonus: i32,
    pub preferred_bonus: i32,
    pub disliked_penalty: i32,
    pub missing_required_penalty: i32,
}

impl Default for TechnologyScorePolicy {
    fn default() -> Self {
        Self {
            required: Vec::new(),
            preferred: Vec::new(),
            disliked: Vec::new(),
            rejected: Vec::new(),
            required_bonus: 10,
            preferred_bonus: 5,
            disliked_penalty: -5,
            missing_required_penalty: -15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SalaryScorePolicy {
    pub minimum: Option<i64>,
    pub target: Option<i64>,
    /// Points lost per $10k below target, capped at -20.
    pub below_target_penalty: i32,
    pub meets_target_bonus: i32,
    pub equity_bonus: i32,
    pub contract_penalty: i32,
    pub no_salary_penalty: i32,
}

impl Default for SalaryScorePolicy {
    fn default() -> Self {
        Self {
            minimum: None,
            target: None,
            below_target_penalty: 2,
            meets_target_bonus: 5,
            equity_bonus: 5,
            contract_penalty: -15,
            no_salary_penalty: -5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExperiencePolicy {
    pub user_years: i32,
    /// Requirements beyond this are treated as unrealistic.
    pub max_required: i32,
    pub overqualified_penalty: i32,
}

impl Default for ExperiencePolicy {
    fn default() -> Self {
        Self {
            user_years: 0,
            max_required: 15,
            overqualified_penalty: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FreshnessScorePolicy {
    pub fresh_bonus_days: i64,
    pub fresh_bonus: i32,
    pub stale_threshold_days: i64,
    pub stale_penalty: i32,
    pub very_stale_days: i64,
    pub very_stale_penalty: i32,
    pub repost_penalty: i32,
}

impl Default for FreshnessScorePolicy {
    fn default() -> Self {
        Self {
            fresh_bonus_days: 2,
            fresh_bonus: 5,
            stale_threshold_days: 14,
            stale_penalty: -5,
            very_stale_days: 30,
            very_stale_penalty: -10,
            repost_penalty: -5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoleFitPolicy {
    pub backend_bonus: i32,
    pub ml_ai_bonus: i32,
    pub devops_sre_bonus: i32,
    pub data_bonus: i32,
    pub security_bonus: i32,
    pub lead_bonus: i32,
    pub frontend_penalty: i32,
    pub consulting_penalty: i32,
    pub management_penalty: i32,
    /// <= -100 makes a clearance requirement a hard reject.
    pub clearance_penalty: i32,
}

impl Default for RoleFitPolicy {
    fn default() -> Self {
        Self {
            backend_bonus: 10,
            ml_ai_bonus: 10,
            devops_sre_bonus: 5,
            data_bonus: 5,
            security_bonus: 5,
            lead_bonus: 5,
            frontend_penalty: -10,
            consulting_penalty: -10,
            management_penalty: -10,
            clearance_penalty: -100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanySignalPolicy {
    pub preferred_city: String,
    pub preferred_city_bonus: i32,
    pub remote_first_bonus: i32,
    pub ai_ml_focus_bonus: i32,
    pub large_company_bonus: i32,
    pub small_company_penalty: i32,
    pub large_company_threshold: i32,
    pub small_company_threshold: i32,
    pub startup_bonus: i32,
}

impl Default for CompanySignalPolicy {
    fn default() -> Self {
        Self {
            preferred_city: String::new(),
            preferred_city_bonus: 5,
            remote_first_bonus: 5,
            ai_ml_focus_bonus: 5,
            large_company_bonus: 0,
            small_company_penalty: 0,
            large_company_threshold: 1000,
            small_company_threshold: 50,
            startup_bonus: 0,
        }
    }
}

// --- strike engine section of match-policy ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HardRejectionPolicy {
    /// Whitelist: a title must contain one of these (empty disables the check).
    pub required_title_keywords: Vec<String>,
    pub excluded_seniority: Vec<String>,
    pub min_salary_floor: i64,
    pub reject_commission_only: bool,
}

impl Default for HardRejectionPolicy {
    fn default() -> Self {
        Self {
            required_title_keywords: Vec::new(),
            excluded_seniority: vec!["intern".into(), "internship".into(), "entry level".into()],
            min_salary_floor: 100_000,
            reject_commission_only: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteStrikePolicy {
    pub allow_remote: bool,
    pub allow_onsite: bool,
    pub allow_hybrid_in_timezone: bool,
    pub max_timezone_diff_hours: f64,
    pub per_hour_timezone_penalty: i32,
    pub hard_timezone_penalty: i32,
}

impl Default for RemoteStrikePolicy {
    fn default() -> Self {
        Self {
            allow_remote: true,
            allow_onsite: false,
            allow_hybrid_in_timezone: true,
            max_timezone_diff_hours: 8.0,
            per_hour_timezone_penalty: 1,
            hard_timezone_penalty: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SalaryStrikePolicy {
    pub enabled: bool,
    pub threshold: i64,
    pub points: i32,
}

impl Default for SalaryStrikePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 150_000,
            points: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QualityStrikePolicy {
    pub min_description_length: usize,
    pub short_description_points: i32,
    pub buzzwords: Vec<String>,
    pub buzzword_points: i32,
}

impl Default for QualityStrikePolicy {
    fn default() -> Self {
        Self {
            min_description_length: 200,
            short_description_points: 1,
            buzzwords: Vec::new(),
            buzzword_points: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgeStrikePolicy {
    pub enabled: bool,
    /// Older than this many days adds a strike.
    pub strike_days: i64,
    /// Older than this many days is a hard reject.
    pub reject_days: i64,
    pub points: i32,
}

impl Default for AgeStrikePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            strike_days: 1,
            reject_days: 7,
            points: 1,
        }
    }
}

/// Ranking of a technology token for the strike engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechRank {
    Ok,
    Required,
    Preferred,
    Strike,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechRankEntry {
    pub rank: TechRank,
    #[serde(default)]
    pub points: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrikeEnginePolicy {
    pub enabled: bool,
    pub strike_threshold: i32,
    pub hard_rejections: HardRejectionPolicy,
    pub remote_policy: RemoteStrikePolicy,
    pub salary_strike: SalaryStrikePolicy,
    /// Title token -> strike points.
    pub seniority_strikes: BTreeMap<String, i32>,
    pub quality_strikes: QualityStrikePolicy,
    pub age_strike: AgeStrikePolicy,
    /// Technology token -> rank.
    pub technology_ranks: BTreeMap<String, TechRankEntry>,
}

impl Default for StrikeEnginePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            strike_threshold: 5,
            hard_rejections: HardRejectionPolicy::default(),
            remote_policy: RemoteStrikePolicy::default(),
            salary_strike: SalaryStrikePolicy::default(),
            seniority_strikes: BTreeMap::new(),
            quality_strikes: QualityStrikePolicy::default(),
            age_strike: AgeStrikePolicy::default(),
            technology_ranks: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StopList {
    pub excluded_companies: Vec<String>,
    pub excluded_keywords: Vec<String>,
    pub excluded_domains: Vec<String>,
}

/// The match-policy document: deterministic scoring plus the strike engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchPolicy {
    pub min_score: i32,
    pub seniority: SeniorityPolicy,
    pub location: LocationScorePolicy,
    pub technology: TechnologyScorePolicy,
    pub salary: SalaryScorePolicy,
    pub experience: ExperiencePolicy,
    pub freshness: FreshnessScorePolicy,
    pub role_fit: RoleFitPolicy,
    pub company: CompanySignalPolicy,
    pub user_skills: Vec<String>,
    pub strike_engine: StrikeEnginePolicy,
    pub stop_list: StopList,
    /// Relocation context shared with the strike engine.
    pub relocation_allowed: bool,
    pub relocation_penalty_points: i32,
    pub location_penalty_points: i32,
    pub ambiguous_location_penalty_points: i32,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            min_score: 50,
            seniority: SeniorityPolicy::default(),
            location: LocationScorePolicy::default(),
            technology: TechnologyScorePolicy::default(),
            salary: SalaryScorePolicy::default(),
            experience: ExperiencePolicy::default(),
            freshness: FreshnessScorePolicy::default(),
            role_fit: RoleFitPolicy::default(),
            company: CompanySignalPolicy::default(),
            user_skills: Vec::new(),
            strike_engine: StrikeEnginePolicy::default(),
            stop_list: StopList::default(),
            relocation_allowed: false,
            relocation_penalty_points: 80,
            location_penalty_points: 60,
            ambiguous_location_penalty_points: 40,
        }
    }
}

// --- scraping-settings ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrapingSettings {
    pub max_html_sample_length: usize,
    /// Applied after every detail-page request, success or not.
    pub fetch_delay_seconds: f64,
    pub list_timeout_secs: u64,
    pub detail_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ScrapingSettings {
    fn default() -> Self {
        Self {
            max_html_sample_length: 20_000,
            fetch_delay_seconds: 1.0,
            list_timeout_secs: 30,
            detail_timeout_secs: 15,
            user_agent: "JobSignalBot/1.0".to_string(),
        }
    }
}

// --- Bundle loaded at startup ---

/// All policy documents, resolved at startup. Construction fails fast when a
/// required document is missing or malformed.
#[derive(Debug, Clone)]
pub struct Policies {
    pub prefilter: PrefilterPolicy,
    pub matching: MatchPolicy,
    pub scraping: ScrapingSettings,
}

impl Policies {
    pub fn from_documents(
        prefilter: Option<serde_json::Value>,
        matching: Option<serde_json::Value>,
        scraping: Option<serde_json::Value>,
    ) -> Result<Self, JobSignalError> {
        let prefilter = prefilter
            .ok_or_else(|| JobSignalError::Config("missing prefilter-policy document".into()))?;
        let matching = matching
            .ok_or_else(|| JobSignalError::Config("missing match-policy document".into()))?;

        Ok(Self {
            prefilter: serde_json::from_value(prefilter)
                .map_err(|e| JobSignalError::Config(format!("prefilter-policy: {e}")))?,
            matching: serde_json::from_value(matching)
                .map_err(|e| JobSignalError::Config(format!("match-policy: {e}")))?,
            scraping: match scraping {
                Some(v) => serde_json::from_value(v)
                    .map_err(|e| JobSignalError::Config(format!("scraping-settings: {e}")))?,
                None => ScrapingSettings::default(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn policies_fail_fast_on_missing_documents() {
        let err = Policies::from_documents(None, Some(json!({})), None).unwrap_err();
        assert!(err.to_string().contains("prefilter-policy"));

        let err = Policies::from_documents(Some(json!({})), None, None).unwrap_err();
        assert!(err.to_string().contains("match-policy"));
    }

    #[test]
    fn policies_parse_camel_case_documents() {
        let policies = Policies::from_documents(
            Some(json!({
                "title": {"excludedKeywords": ["sales"]},
                "freshness": {"maxAgeDays": 14},
                "workArrangement": {"allowOnsite": false, "userLocation": "Portland, OR"},
                "salary": {"minimum": 120000},
            })),
            Some(json!({
                "minScore": 60,
                "location": {"userTimezone": -8, "maxTimezoneDiffHours": 3},
                "strikeEngine": {
                    "strikeThreshold": 4,
                    "technologyRanks": {"php": {"rank": "strike", "points": 2}}
                },
                "stopList": {"excludedCompanies": ["Shady Corp"]},
            })),
            Some(json!({"fetchDelaySeconds": 0.5})),
        )
        .unwrap();

        assert_eq!(policies.prefilter.title.excluded_keywords, vec!["sales"]);
        assert_eq!(policies.prefilter.freshness.max_age_days, 14);
        assert!(!policies.prefilter.work_arrangement.allow_onsite);
        assert_eq!(policies.matching.min_score, 60);
        assert_eq!(policies.matching.strike_engine.strike_threshold, 4);
        assert_eq!(
            policies
                .matching
                .strike_engine
                .technology_ranks
                .get("php")
                .map(|t| t.rank),
            Some(TechRank::Strike)
        );
        assert!((policies.scraping.fetch_delay_seconds - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn scraping_settings_default_when_absent() {
        let policies =
            Policies::from_documents(Some(json!({})), Some(json!({})), None).unwrap();
        assert_eq!(policies.scraping.list_timeout_secs, 30);
        assert_eq!(policies.scraping.detail_timeout_secs, 15);
    }
}
