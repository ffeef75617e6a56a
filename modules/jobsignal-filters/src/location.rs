//! Work-arrangement inference and city/timezone location rules, shared by
//! the pre-filter and the strike engine.

use jobsignal_common::Posting;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkArrangement {
    Remote,
    Hybrid,
    Onsite,
}

impl std::fmt::Display for WorkArrangement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkArrangement::Remote => write!(f, "remote"),
            WorkArrangement::Hybrid => write!(f, "hybrid"),
            WorkArrangement::Onsite => write!(f, "onsite"),
        }
    }
}

fn li_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)#\s*li[-_ ]?(remote|hybrid|onsite)\b").expect("valid regex")
    })
}

/// Infer the work arrangement from whatever structured evidence the posting
/// carries. Returns `None` when nothing is conclusive.
pub fn infer_work_arrangement(
    posting: &Posting,
    is_remote_source: bool,
    remote_keywords: &[String],
) -> Option<WorkArrangement> {
    // Remote-only boards label every posting.
    if is_remote_source {
        return Some(WorkArrangement::Remote);
    }

    if posting.is_remote == Some(true) {
        return Some(WorkArrangement::Remote);
    }

    // Greenhouse-style "Location Type" metadata.
    if let Some(location_type) = posting.metadata.get("Location Type") {
        let lt = location_type.to_lowercase();
        if remote_keywords.iter().any(|kw| lt.contains(kw.as_str())) {
            return Some(WorkArrangement::Remote);
        }
        if lt.contains("hybrid") {
            return Some(WorkArrangement::Hybrid);
        }
        if lt.contains("onsite") || lt.contains("on-site") || lt.contains("office") {
            return Some(WorkArrangement::Onsite);
        }
    }

    // LinkedIn wrapping hashtags live in the description.
    if let Some(caps) = li_tag_re().captures(&posting.description) {
        return match caps.get(1)?.as_str().to_lowercase().as_str() {
            "remote" => Some(WorkArrangement::Remote),
            "hybrid" => Some(WorkArrangement::Hybrid),
            "onsite" => Some(WorkArrangement::Onsite),
            _ => None,
        };
    }

    for office in &posting.offices {
        let office = office.to_lowercase();
        if remote_keywords.iter().any(|kw| office.contains(kw.as_str())) {
            return Some(WorkArrangement::Remote);
        }
    }

    let location = posting.location.to_lowercase();
    if !location.is_empty() {
        if remote_keywords.iter().any(|kw| location.contains(kw.as_str())) {
            return Some(WorkArrangement::Remote);
        }
        if location.contains("hybrid") {
            return Some(WorkArrangement::Hybrid);
        }
    }

    None
}

const GENERIC_LOCATIONS: [&str; 4] = ["remote", "worldwide", "anywhere", "global"];

/// First usable location string for timezone lookup, preferring the
/// location field, then metadata, then offices. Generic "Remote"-style
/// values are not locations.
pub fn extract_job_location(posting: &Posting) -> Option<String> {
    let usable = |s: &str| {
        let t = s.trim();
        !t.is_empty() && !GENERIC_LOCATIONS.contains(&t.to_lowercase().as_str())
    };

    if usable(&posting.location) {
        return Some(posting.location.trim().to_string());
    }

    for key in ["Location", "location", "Office Location", "Office", "headquarters"] {
        if let Some(value) = posting.metadata.get(key) {
            if usable(value) {
                return Some(value.trim().to_string());
            }
        }
    }

    posting
        .offices
        .iter()
        .find(|o| usable(o))
        .map(|o| o.trim().to_string())
}

/// Split "Portland, OR" into lowercase (city, state) tokens.
pub fn split_location(location: &str) -> (Option<String>, Option<String>) {
    let lower = location.to_lowercase();
    if lower.trim().is_empty() {
        return (None, None);
    }

    if let Some((city, state)) = lower.split_once(',') {
        let city = city.trim();
        let state = state.trim();
        return (
            (!city.is_empty()).then(|| city.to_string()),
            (!state.is_empty()).then(|| state.to_string()),
        );
    }

    let parts: Vec<&str> = lower.split_whitespace().collect();
    if parts.len() >= 2 {
        return (
            Some(parts[..parts.len() - 1].join(" ")),
            Some(parts[parts.len() - 1].to_string()),
        );
    }
    (Some(lower.trim().to_string()), None)
}

fn word_match(needle: &str, haystack: &str) -> bool {
    Regex::new(&format!(r"\b{}\b", regex::escape(needle)))
        .map(|re| re.is_match(haystack))
        .unwrap_or(false)
}

/// Loose city+state matching between a posting and the configured user
/// location. `Some(true)` on a clear match, `Some(false)` when location data
/// exists and clearly differs, `None` when there is nothing to decide on
/// (missing data must not reject).
pub fn is_in_user_location(posting: &Posting, user_location: &str) -> Option<bool> {
    if user_location.trim().is_empty() {
        return None;
    }

    let mut candidates: Vec<String> = Vec::new();
    if !posting.location.trim().is_empty() {
        candidates.push(posting.location.clone());
    }
    for key in ["Location", "location", "Office Location", "Office"] {
        if let Some(value) = posting.metadata.get(key) {
            if !value.trim().is_empty() {
                candidates.push(value.clone());
            }
        }
    }

    if candidates.is_empty() {
        return None;
    }

    let (city_token, state_token) = split_location(user_location);
    let user_squashed = user_location.replace(',', "").to_lowercase();

    for loc in &candidates {
        let loc_lower = loc.to_lowercase();

        if loc_lower.replace(',', "").contains(&user_squashed) {
            return Some(true);
        }

        let (_, loc_state) = split_location(loc);

        if let Some(city) = &city_token {
            if !word_match(city, &loc_lower) {
                continue;
            }
        }
        if let Some(state) = &state_token {
            let state_ok = match &loc_state {
                Some(ls) => ls == state || (state.len() == 2 && ls.starts_with(state.as_str())),
                None => false,
            } || word_match(state, &loc_lower);
            if !state_ok {
                continue;
            }
        }
        return Some(true);
    }

    Some(false)
}

// --- City-based timezone evaluation ---

/// UTC offsets for cities that show up constantly in job postings. Standard
/// time offsets; close enough for a coarse compatibility gate.
const CITY_OFFSETS: [(&str, f64); 38] = [
    ("san francisco", -8.0),
    ("los angeles", -8.0),
    ("seattle", -8.0),
    ("portland", -8.0),
    ("vancouver", -8.0),
    ("denver", -7.0),
    ("phoenix", -7.0),
    ("salt lake city", -7.0),
    ("austin", -6.0),
    ("dallas", -6.0),
    ("houston", -6.0),
    ("chicago", -6.0),
    ("minneapolis", -6.0),
    ("mexico city", -6.0),
    ("new york", -5.0),
    ("boston", -5.0),
    ("atlanta", -5.0),
    ("miami", -5.0),
    ("toronto", -5.0),
    ("washington", -5.0),
    ("philadelphia", -5.0),
    ("sao paulo", -3.0),
    ("buenos aires", -3.0),
    ("london", 0.0),
    ("dublin", 0.0),
    ("lisbon", 0.0),
    ("madrid", 1.0),
    ("paris", 1.0),
    ("berlin", 1.0),
    ("amsterdam", 1.0),
    ("stockholm", 1.0),
    ("warsaw", 1.0),
    ("tel aviv", 2.0),
    ("dubai", 4.0),
    ("bangalore", 5.5),
    ("singapore", 8.0),
    ("tokyo", 9.0),
    ("sydney", 10.0),
];

const STATE_OFFSETS: [(&str, f64); 16] = [
    ("ca", -8.0),
    ("california", -8.0),
    ("wa", -8.0),
    ("or", -8.0),
    ("oregon", -8.0),
    ("co", -7.0),
    ("az", -7.0),
    ("tx", -6.0),
    ("texas", -6.0),
    ("il", -6.0),
    ("mn", -6.0),
    ("ny", -5.0),
    ("new york", -5.0),
    ("ma", -5.0),
    ("fl", -5.0),
    ("ga", -5.0),
];

/// Look up a UTC offset for a location string.
pub fn timezone_offset_for(location: &str) -> Option<f64> {
    let lower = location.to_lowercase();
    for (city, offset) in CITY_OFFSETS {
        if lower.contains(city) {
            return Some(offset);
        }
    }
    let (_, state) = split_location(&lower);
    if let Some(state) = state {
        for (token, offset) in STATE_OFFSETS {
            if state == token {
                return Some(offset);
            }
        }
    }
    None
}

/// Absolute timezone difference in hours between two locations, when both
/// resolve.
pub fn timezone_diff_hours(user_location: &str, job_location: &str) -> Option<f64> {
    let user = timezone_offset_for(user_location)?;
    let job = timezone_offset_for(job_location)?;
    Some((user - job).abs())
}

// --- Unified location rules (strike engine) ---

pub struct LocationContext {
    pub user_city: Option<String>,
    pub user_timezone: Option<f64>,
    pub relocation_allowed: bool,
    pub relocation_penalty: i32,
    pub max_timezone_diff_hours: f64,
    pub per_hour_penalty: i32,
    pub hard_timezone_penalty: i32,
}

pub struct LocationEval {
    pub hard_reject: bool,
    pub reason: Option<String>,
    pub strikes: i32,
}

impl LocationEval {
    fn pass() -> Self {
        Self {
            hard_reject: false,
            reason: None,
            strikes: 0,
        }
    }
}

/// Apply the unified remote/hybrid/onsite + relocation + timezone rules.
///
/// Remote roles take timezone strikes rather than hard rejects; onsite and
/// hybrid roles outside the user's city hard-reject unless relocation is
/// allowed.
pub fn evaluate_location_rules(
    job_location: &str,
    job_timezone: Option<f64>,
    remote: bool,
    hybrid: bool,
    ctx: &LocationContext,
) -> LocationEval {
    if remote {
        if let (Some(user_tz), Some(job_tz)) = (ctx.user_timezone, job_timezone) {
            let diff = (user_tz - job_tz).abs();
            if diff > ctx.max_timezone_diff_hours {
                return LocationEval {
                    hard_reject: false,
                    reason: Some(format!(
                        "Timezone diff {diff:.1}h exceeds {:.1}h",
                        ctx.max_timezone_diff_hours
                    )),
                    strikes: ctx.hard_timezone_penalty,
                };
            }
            let strikes = (diff * ctx.per_hour_penalty as f64).round() as i32;
            if strikes > 0 {
                return LocationEval {
                    hard_reject: false,
                    reason: Some(format!("Timezone diff {diff:.1}h")),
                    strikes,
                };
            }
        }
        return LocationEval::pass();
    }

    // Hybrid or onsite: the job has a place, and the user has to be there.
    let Some(user_city) = ctx.user_city.as_deref().filter(|c| !c.is_empty()) else {
        return LocationEval::pass();
    };
    if job_location.trim().is_empty() {
        // Missing data never rejects.
        return LocationEval::pass();
    }

    let (user_city_token, _) = split_location(user_city);
    let matches_city = user_city_token
        .map(|c| word_match(&c, &job_location.to_lowercase()))
        .unwrap_or(false);

    if matches_city {
        // In-city hybrid may still carry a timezone component of zero.
        return LocationEval::pass();
    }

    if !ctx.relocation_allowed {
        let kind = if hybrid { "Hybrid" } else { "Onsite" };
        return LocationEval {
            hard_reject: true,
            reason: Some(format!("{kind} role in {job_location} requires being outside {user_city}")),
            strikes: 0,
        };
    }

    LocationEval {
        hard_reject: false,
        reason: Some(format!("Relocation required to {job_location}")),
        strikes: ctx.relocation_penalty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsignal_common::policy::default_remote_keywords;

    fn posting() -> Posting {
        Posting::new("Engineer", "https://x.test/1")
    }

    #[test]
    fn remote_source_forces_remote() {
        let p = posting();
        assert_eq!(
            infer_work_arrangement(&p, true, &default_remote_keywords()),
            Some(WorkArrangement::Remote)
        );
    }

    #[test]
    fn explicit_flag_wins() {
        let mut p = posting();
        p.is_remote = Some(true);
        assert_eq!(
            infer_work_arrangement(&p, false, &default_remote_keywords()),
            Some(WorkArrangement::Remote)
        );
    }

    #[test]
    fn location_type_metadata() {
        let mut p = posting();
        p.metadata.insert("Location Type".into(), "Hybrid".into());
        assert_eq!(
            infer_work_arrangement(&p, false, &default_remote_keywords()),
            Some(WorkArrangement::Hybrid)
        );

        p.metadata.insert("Location Type".into(), "On-site".into());
        assert_eq!(
            infer_work_arrangement(&p, false, &default_remote_keywords()),
            Some(WorkArrangement::Onsite)
        );
    }

    #[test]
    fn linkedin_hashtags_in_description() {
        let mut p = posting();
        p.description = "Great role. #LI-Remote".to_string();
        assert_eq!(
            infer_work_arrangement(&p, false, &default_remote_keywords()),
            Some(WorkArrangement::Remote)
        );

        p.description = "Great role. #LI-Hybrid".to_string();
        assert_eq!(
            infer_work_arrangement(&p, false, &default_remote_keywords()),
            Some(WorkArrangement::Hybrid)
        );
    }

    #[test]
    fn location_string_hints() {
        let mut p = posting();
        p.location = "Remote - US".to_string();
        assert_eq!(
            infer_work_arrangement(&p, false, &default_remote_keywords()),
            Some(WorkArrangement::Remote)
        );

        p.location = "New York (Hybrid)".to_string();
        assert_eq!(
            infer_work_arrangement(&p, false, &default_remote_keywords()),
            Some(WorkArrangement::Hybrid)
        );
    }

    #[test]
    fn unknown_arrangement_is_none() {
        let mut p = posting();
        p.location = "New York, NY".to_string();
        assert_eq!(infer_work_arrangement(&p, false, &default_remote_keywords()), None);
    }

    #[test]
    fn user_location_matching() {
        let mut p = posting();
        p.location = "Portland, OR".to_string();
        assert_eq!(is_in_user_location(&p, "Portland, OR"), Some(true));
        assert_eq!(is_in_user_location(&p, "Austin, TX"), Some(false));

        // State-code normalization: a spelled-out posting state still
        // matches a two-letter user state code.
        p.location = "Portland, Oregon".to_string();
        assert_eq!(is_in_user_location(&p, "Portland, OR"), Some(true));

        p.location = String::new();
        assert_eq!(is_in_user_location(&p, "Portland, OR"), None);
    }

    #[test]
    fn timezone_lookup_and_diff() {
        assert_eq!(timezone_offset_for("San Francisco, CA"), Some(-8.0));
        assert_eq!(timezone_offset_for("Berlin, Germany"), Some(1.0));
        assert_eq!(timezone_diff_hours("Portland, OR", "Berlin"), Some(9.0));
        assert_eq!(timezone_diff_hours("Portland, OR", "Narnia"), None);
    }

    fn ctx() -> LocationContext {
        LocationContext {
            user_city: Some("Portland, OR".to_string()),
            user_timezone: Some(-8.0),
            relocation_allowed: false,
            relocation_penalty: 80,
            max_timezone_diff_hours: 8.0,
            per_hour_penalty: 1,
            hard_timezone_penalty: 3,
        }
    }

    #[test]
    fn onsite_outside_city_hard_rejects() {
        let eval = evaluate_location_rules("New York, NY", Some(-5.0), false, false, &ctx());
        assert!(eval.hard_reject);
    }

    #[test]
    fn onsite_in_city_passes() {
        let eval = evaluate_location_rules("Portland, OR", Some(-8.0), false, false, &ctx());
        assert!(!eval.hard_reject);
        assert_eq!(eval.strikes, 0);
    }

    #[test]
    fn remote_far_timezone_takes_strikes_not_reject() {
        let eval = evaluate_location_rules("Tokyo", Some(9.0), true, false, &ctx());
        assert!(!eval.hard_reject);
        assert_eq!(eval.strikes, 3, "beyond max diff takes the hard penalty");

        let eval = evaluate_location_rules("New York", Some(-5.0), true, false, &ctx());
        assert!(!eval.hard_reject);
        assert_eq!(eval.strikes, 3, "3h diff at 1 point per hour");
    }

    #[test]
    fn relocation_allowed_converts_reject_to_strikes() {
        let mut c = ctx();
        c.relocation_allowed = true;
        let eval = evaluate_location_rules("New York, NY", Some(-5.0), false, false, &c);
        assert!(!eval.hard_reject);
        assert_eq!(eval.strikes, 80);
    }

    #[test]
    fn missing_job_location_passes() {
        let eval = evaluate_location_rules("", None, false, true, &ctx());
        assert!(!eval.hard_reject);
        assert_eq!(eval.strikes, 0);
    }
}
