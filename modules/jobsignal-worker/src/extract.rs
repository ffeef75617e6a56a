//! Job-fact extraction for the scoring engine.
//!
//! The deterministic baseline reads everything it can from the posting
//! itself; when an LLM agent is configured its JSON output is merged on
//! top, field by field, but the pipeline never depends on it.

use std::sync::Arc;

use ai_client::{extract_json, LlmAgent, TaskType};
use jobsignal_common::Posting;
use jobsignal_filters::location::{
    extract_job_location, infer_work_arrangement, timezone_offset_for,
};
use jobsignal_filters::{extract_salary, JobExtraction};
use jobsignal_scraper::dates::age_days;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

const KNOWN_TECH: [&str; 24] = [
    "rust", "python", "java", "javascript", "typescript", "react", "node", "kubernetes",
    "docker", "postgres", "postgresql", "mysql", "redis", "kafka", "aws", "gcp", "azure",
    "terraform", "ruby", "php", "c++", "c#", "scala", "elixir",
];

fn years_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{1,2})\s*(?:\+|\s*-\s*(\d{1,2}))?\s*years?").expect("valid regex")
    })
}

/// Deterministic extraction from the posting text and structured fields.
pub fn extract_heuristic(posting: &Posting, remote_keywords: &[String]) -> JobExtraction {
    let title_lower = posting.title.to_lowercase();
    let description_lower = posting.description.to_lowercase();
    let combined = format!("{title_lower} {description_lower}");

    let seniority = ["staff", "principal", "senior", "lead", "junior", "intern"]
        .iter()
        .find(|level| title_lower.contains(*level))
        .map(|level| level.to_string());

    let work_arrangement =
        infer_work_arrangement(posting, false, remote_keywords).map(|a| a.to_string());

    let job_location = extract_job_location(posting);
    let timezone = job_location.as_deref().and_then(timezone_offset_for);

    let city = job_location
        .as_deref()
        .and_then(|loc| loc.split(',').next())
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    // Word-edge matching that survives tokens ending in symbols (c++, c#).
    let technologies: Vec<String> = KNOWN_TECH
        .iter()
        .filter(|tech| {
            Regex::new(&format!(r"(^|[^\w]){}($|[^\w+#])", regex::escape(tech)))
                .map(|re| re.is_match(&combined))
                .unwrap_or(false)
        })
        .map(|t| t.to_string())
        .collect();

    let (experience_min, experience_max) = years_re()
        .captures(&description_lower)
        .map(|caps| {
            let min = caps.get(1).and_then(|m| m.as_str().parse::<i32>().ok());
            let max = caps.get(2).and_then(|m| m.as_str().parse::<i32>().ok());
            (min, max)
        })
        .unwrap_or((None, None));

    let days_old = posting
        .posted_date
        .as_deref()
        .and_then(|d| age_days(d, chrono::Utc::now()));

    let is_contract = posting
        .employment_type
        .as_deref()
        .map(|t| t.to_lowercase().contains("contract"))
        .unwrap_or(false)
        || combined.contains("contract position")
        || combined.contains("contract role");

    JobExtraction {
        seniority,
        work_arrangement,
        timezone,
        city,
        relocation_required: combined.contains("relocation required")
            || combined.contains("must relocate"),
        technologies,
        salary_min: posting.salary_min,
        salary_max: posting.salary_max.or_else(|| extract_salary(posting)),
        includes_equity: combined.contains("equity") || combined.contains("stock options"),
        is_contract,
        experience_min,
        experience_max,
        days_old,
        is_repost: false,
        requires_clearance: combined.contains("security clearance")
            || combined.contains("ts/sci"),
        is_backend: combined.contains("backend") || combined.contains("back-end"),
        is_ml_ai: combined.contains("machine learning")
            || combined.contains(" ml ")
            || combined.contains("deep learning")
            || combined.contains(" ai "),
        is_devops_sre: combined.contains("devops")
            || combined.contains("site reliability")
            || combined.contains("sre"),
        is_data: combined.contains("data engineer") || combined.contains("data pipeline"),
        is_security: combined.contains("security engineer") || combined.contains("appsec"),
        is_lead: title_lower.contains("lead") || title_lower.contains("staff"),
        is_frontend: combined.contains("frontend") || combined.contains("front-end"),
        is_fullstack: combined.contains("full stack") || combined.contains("fullstack"),
        is_consulting: combined.contains("consulting") || combined.contains("consultancy"),
        is_management: title_lower.contains("manager") || title_lower.contains("director"),
    }
}

/// Extraction with optional LLM assistance layered over the heuristics.
pub async fn extract_job_facts(
    posting: &Posting,
    remote_keywords: &[String],
    agent: Option<&Arc<dyn LlmAgent>>,
) -> JobExtraction {
    let mut extraction = extract_heuristic(posting, remote_keywords);

    let Some(agent) = agent else {
        return extraction;
    };

    let prompt = format!(
        "Extract structured facts from this job posting. Respond with JSON only, using null \
         for unknown values:\n\
         {{\"seniority\": \"senior|staff|principal|lead|mid-level|junior|intern|unknown\",\n \
         \"work_arrangement\": \"remote|hybrid|onsite|unknown\", \"timezone\": null,\n \
         \"city\": null, \"relocation_required\": false, \"technologies\": [],\n \
         \"salary_min\": null, \"salary_max\": null, \"includes_equity\": false,\n \
         \"is_contract\": false, \"experience_min\": null, \"experience_max\": null,\n \
         \"requires_clearance\": false, \"is_backend\": false, \"is_ml_ai\": false,\n \
         \"is_devops_sre\": false, \"is_data\": false, \"is_security\": false,\n \
         \"is_lead\": false, \"is_frontend\": false, \"is_fullstack\": false,\n \
         \"is_consulting\": false, \"is_management\": false}}\n\n\
         Title: {}\nLocation: {}\nSalary: {}\n\nDescription:\n{}",
        posting.title,
        posting.location,
        posting.salary.as_deref().unwrap_or("unlisted"),
        posting.description.chars().take(6000).collect::<String>(),
    );

    match agent
        .execute(TaskType::JobExtraction, &prompt, 1024, 0.0)
        .await
    {
        Ok(response) => {
            if let Some(value) = extract_json(&response) {
                merge_llm_extraction(&mut extraction, &value);
            }
        }
        Err(e) => debug!(error = %e, "LLM extraction failed; using heuristics"),
    }

    extraction
}

/// Merge LLM output over the heuristic baseline. Unknowns never overwrite.
fn merge_llm_extraction(extraction: &mut JobExtraction, value: &serde_json::Value) {
    if let Some(seniority) = value["seniority"].as_str() {
        if !seniority.is_empty() && seniority != "unknown" {
            extraction.seniority = Some(seniority.to_string());
        }
    }
    if let Some(arrangement) = value["work_arrangement"].as_str() {
        if matches!(arrangement, "remote" | "hybrid" | "onsite") {
            extraction.work_arrangement = Some(arrangement.to_string());
        }
    }
    if let Some(tz) = value["timezone"].as_f64() {
        extraction.timezone = Some(tz);
    }
    if let Some(city) = value["city"].as_str() {
        if !city.is_empty() {
            extraction.city = Some(city.to_string());
        }
    }
    if let Some(technologies) = value["technologies"].as_array() {
        let techs: Vec<String> = technologies
            .iter()
            .filter_map(|t| t.as_str().map(str::to_string))
            .collect();
        if !techs.is_empty() {
            extraction.technologies = techs;
        }
    }
    for (key, slot) in [
        ("salary_min", &mut extraction.salary_min),
        ("salary_max", &mut extraction.salary_max),
    ] {
        if let Some(v) = value[key].as_i64() {
            *slot = Some(v);
        }
    }
    for (key, slot) in [
        ("experience_min", &mut extraction.experience_min),
        ("experience_max", &mut extraction.experience_max),
    ] {
        if let Some(v) = value[key].as_i64() {
            *slot = Some(v as i32);
        }
    }
    for (key, slot) in [
        ("relocation_required", &mut extraction.relocation_required),
        ("includes_equity", &mut extraction.includes_equity),
        ("is_contract", &mut extraction.is_contract),
        ("requires_clearance", &mut extraction.requires_clearance),
        ("is_backend", &mut extraction.is_backend),
        ("is_ml_ai", &mut extraction.is_ml_ai),
        ("is_devops_sre", &mut extraction.is_devops_sre),
        ("is_data", &mut extraction.is_data),
        ("is_security", &mut extraction.is_security),
        ("is_lead", &mut extraction.is_lead),
        ("is_frontend", &mut extraction.is_frontend),
        ("is_fullstack", &mut extraction.is_fullstack),
        ("is_consulting", &mut extraction.is_consulting),
        ("is_management", &mut extraction.is_management),
    ] {
        if let Some(v) = value[key].as_bool() {
            *slot |= v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsignal_common::policy::default_remote_keywords;
    use serde_json::json;

    fn posting() -> Posting {
        let mut p = Posting::new(
            "Senior Backend Engineer",
            "https://example.com/jobs/1",
        );
        p.location = "Remote".to_string();
        p.description = "We need 5+ years of experience with Rust and Postgres. \
                         Fully remote backend role with equity."
            .to_string();
        p.salary = Some("$150,000 - $180,000".to_string());
        p
    }

    #[test]
    fn heuristics_read_the_posting() {
        let extraction = extract_heuristic(&posting(), &default_remote_keywords());
        assert_eq!(extraction.seniority.as_deref(), Some("senior"));
        assert_eq!(extraction.work_arrangement.as_deref(), Some("remote"));
        assert!(extraction.technologies.contains(&"rust".to_string()));
        assert!(extraction.technologies.contains(&"postgres".to_string()));
        assert_eq!(extraction.experience_min, Some(5));
        assert_eq!(extraction.salary_max, Some(180_000));
        assert!(extraction.includes_equity);
        assert!(extraction.is_backend);
        assert!(!extraction.requires_clearance);
    }

    #[test]
    fn llm_merge_fills_without_clobbering() {
        let mut extraction = extract_heuristic(&posting(), &default_remote_keywords());
        merge_llm_extraction(
            &mut extraction,
            &json!({
                "seniority": "unknown",
                "city": "Lisbon",
                "timezone": 0.0,
                "is_contract": true,
            }),
        );
        assert_eq!(
            extraction.seniority.as_deref(),
            Some("senior"),
            "unknown does not overwrite"
        );
        assert_eq!(extraction.city.as_deref(), Some("Lisbon"));
        assert_eq!(extraction.timezone, Some(0.0));
        assert!(extraction.is_contract);
    }

    #[test]
    fn experience_range_parsing() {
        let mut p = posting();
        p.description = "Looking for 3 - 6 years of experience.".to_string();
        let extraction = extract_heuristic(&p, &default_remote_keywords());
        assert_eq!(extraction.experience_min, Some(3));
        assert_eq!(extraction.experience_max, Some(6));
    }
}
