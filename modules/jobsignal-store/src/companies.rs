//! Company store: enriched records keyed by name, with upsert-style merge
//! that never downgrades existing data.

use anyhow::Result;
use chrono::{DateTime, Utc};
use jobsignal_common::{Company, CompanyTier, DataQuality, JobSignalError};
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

const COMPANY_COLUMNS: &str = "id, name, website, about, culture, mission, headquarters, \
     employee_count, tech_stack, is_remote_first, industry, tier, priority_score, data_quality, \
     created_at, updated_at";

/// Data quality by enrichment depth: both long-form fields present is
/// complete, one is partial, neither is minimal.
pub fn classify_data_quality(about: Option<&str>, culture: Option<&str>) -> DataQuality {
    let has_about = about.map(|s| s.trim().len() >= 40).unwrap_or(false);
    let has_culture = culture.map(|s| s.trim().len() >= 40).unwrap_or(false);
    match (has_about, has_culture) {
        (true, true) => DataQuality::Complete,
        (true, false) | (false, true) => DataQuality::Partial,
        (false, false) => DataQuality::Minimal,
    }
}

#[derive(Clone)]
pub struct CompanyStore {
    pool: PgPool,
}

impl CompanyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Company>> {
        let row = sqlx::query_as::<_, CompanyRow>(&format!(
            "SELECT {COMPANY_COLUMNS} FROM companies WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CompanyRow::into_company).transpose()
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Company>> {
        let row = sqlx::query_as::<_, CompanyRow>(&format!(
            "SELECT {COMPANY_COLUMNS} FROM companies WHERE lower(name) = lower($1)"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CompanyRow::into_company).transpose()
    }

    /// Create a bare record carrying only the name; later enrichment fills
    /// the rest. Returns the existing id when the name is already known.
    pub async fn create_stub(&self, name: &str) -> Result<Uuid> {
        if let Some(existing) = self.get_by_name(name).await? {
            return Ok(existing.id);
        }
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO companies (id, name) VALUES ($1, $2)")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        info!(company_id = %id, name, "Created company stub");
        Ok(id)
    }

    /// Persist an enriched record. Existing non-empty fields are kept when
    /// the update carries nothing better; data quality is recomputed from
    /// the merged record.
    pub async fn upsert(&self, company: &Company) -> Result<Uuid> {
        if company.name.trim().is_empty() {
            return Err(JobSignalError::Validation("company requires a name".into()).into());
        }

        let merged = match self.get_by_name(&company.name).await? {
            Some(existing) => merge_company(existing, company.clone()),
            None => company.clone(),
        };
        let quality = classify_data_quality(merged.about.as_deref(), merged.culture.as_deref());

        let id = match self.get_by_name(&company.name).await? {
            Some(existing) => existing.id,
            None => Uuid::new_v4(),
        };

        sqlx::query(
            r#"
            INSERT INTO companies
                (id, name, website, about, culture, mission, headquarters, employee_count,
                 tech_stack, is_remote_first, industry, tier, priority_score, data_quality)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (name) DO UPDATE SET
                website = EXCLUDED.website,
                about = EXCLUDED.about,
                culture = EXCLUDED.culture,
                mission = EXCLUDED.mission,
                headquarters = EXCLUDED.headquarters,
                employee_count = EXCLUDED.employee_count,
                tech_stack = EXCLUDED.tech_stack,
                is_remote_first = EXCLUDED.is_remote_first,
                industry = EXCLUDED.industry,
                tier = EXCLUDED.tier,
                priority_score = EXCLUDED.priority_score,
                data_quality = EXCLUDED.data_quality,
                updated_at = now()
            "#,
        )
        .bind(id)
        .bind(&merged.name)
        .bind(&merged.website)
        .bind(&merged.about)
        .bind(&merged.culture)
        .bind(&merged.mission)
        .bind(&merged.headquarters)
        .bind(merged.employee_count)
        .bind(serde_json::to_value(&merged.tech_stack)?)
        .bind(merged.is_remote_first)
        .bind(&merged.industry)
        .bind(merged.tier.map(tier_to_str))
        .bind(merged.priority_score)
        .bind(quality_to_str(quality))
        .execute(&self.pool)
        .await?;

        Ok(id)
    }
}

/// Field-level merge: incoming values win only when they carry content.
fn merge_company(existing: Company, incoming: Company) -> Company {
    let pick = |old: Option<String>, new: Option<String>| -> Option<String> {
        match new {
            Some(s) if !s.trim().is_empty() => Some(s),
            _ => old,
        }
    };

    Company {
        id: existing.id,
        name: existing.name,
        website: pick(existing.website, incoming.website),
        about: pick(existing.about, incoming.about),
        culture: pick(existing.culture, incoming.culture),
        mission: pick(existing.mission, incoming.mission),
        headquarters: pick(existing.headquarters, incoming.headquarters),
        employee_count: incoming.employee_count.or(existing.employee_count),
        tech_stack: if incoming.tech_stack.is_empty() {
            existing.tech_stack
        } else {
            incoming.tech_stack
        },
        is_remote_first: existing.is_remote_first || incoming.is_remote_first,
        industry: pick(existing.industry, incoming.industry),
        tier: incoming.tier.or(existing.tier),
        priority_score: incoming.priority_score.or(existing.priority_score),
        data_quality: existing.data_quality,
        created_at: existing.created_at,
        updated_at: Utc::now(),
    }
}

fn tier_to_str(tier: CompanyTier) -> &'static str {
    match tier {
        CompanyTier::S => "S",
        CompanyTier::A => "A",
        CompanyTier::B => "B",
        CompanyTier::C => "C",
        CompanyTier::D => "D",
    }
}

fn tier_from_str(raw: &str) -> Option<CompanyTier> {
    match raw {
        "S" => Some(CompanyTier::S),
        "A" => Some(CompanyTier::A),
        "B" => Some(CompanyTier::B),
        "C" => Some(CompanyTier::C),
        "D" => Some(CompanyTier::D),
        _ => None,
    }
}

fn quality_to_str(quality: DataQuality) -> &'static str {
    match quality {
        DataQuality::Complete => "complete",
        DataQuality::Partial => "partial",
        DataQuality::Minimal => "minimal",
    }
}

fn quality_from_str(raw: &str) -> DataQuality {
    match raw {
        "complete" => DataQuality::Complete,
        "partial" => DataQuality::Partial,
        _ => DataQuality::Minimal,
    }
}

/// Row shape of `companies`. Tier/quality are wire strings and the tech
/// stack is JSONB; `into_company` builds the domain type.
#[derive(FromRow)]
struct CompanyRow {
    id: Uuid,
    name: String,
    website: Option<String>,
    about: Option<String>,
    culture: Option<String>,
    mission: Option<String>,
    headquarters: Option<String>,
    employee_count: Option<i32>,
    tech_stack: serde_json::Value,
    is_remote_first: bool,
    industry: Option<String>,
    tier: Option<String>,
    priority_score: Option<f64>,
    data_quality: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CompanyRow {
    fn into_company(self) -> Result<Company> {
        let tech_stack: Vec<String> = serde_json::from_value(self.tech_stack)?;
        let tier = self.tier.as_deref().and_then(tier_from_str);
        let data_quality = quality_from_str(&self.data_quality);

        Ok(Company {
            id: self.id,
            name: self.name,
            website: self.website,
            about: self.about,
            culture: self.culture,
            mission: self.mission,
            headquarters: self.headquarters,
            employee_count: self.employee_count,
            tech_stack,
            is_remote_first: self.is_remote_first,
            industry: self.industry,
            tier,
            priority_score: self.priority_score,
            data_quality,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company(name: &str) -> Company {
        Company {
            id: Uuid::new_v4(),
            name: name.to_string(),
            website: None,
            about: None,
            culture: None,
            mission: None,
            headquarters: None,
            employee_count: None,
            tech_stack: vec![],
            is_remote_first: false,
            industry: None,
            tier: None,
            priority_score: None,
            data_quality: DataQuality::Minimal,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn quality_classification() {
        let long = "x".repeat(80);
        assert_eq!(
            classify_data_quality(Some(&long), Some(&long)),
            DataQuality::Complete
        );
        assert_eq!(
            classify_data_quality(Some(&long), None),
            DataQuality::Partial
        );
        assert_eq!(classify_data_quality(Some("short"), None), DataQuality::Minimal);
        assert_eq!(classify_data_quality(None, None), DataQuality::Minimal);
    }

    #[test]
    fn merge_keeps_existing_when_incoming_is_empty() {
        let mut existing = company("Acme");
        existing.website = Some("https://acme.com".to_string());
        existing.about = Some("Existing about".to_string());

        let mut incoming = company("Acme");
        incoming.website = Some("  ".to_string());
        incoming.culture = Some("Strong engineering culture".to_string());

        let merged = merge_company(existing, incoming);
        assert_eq!(merged.website.as_deref(), Some("https://acme.com"));
        assert_eq!(merged.about.as_deref(), Some("Existing about"));
        assert_eq!(merged.culture.as_deref(), Some("Strong engineering culture"));
    }

    #[test]
    fn merge_prefers_incoming_content() {
        let mut existing = company("Acme");
        existing.headquarters = Some("Old HQ".to_string());
        let mut incoming = company("Acme");
        incoming.headquarters = Some("Lisbon, Portugal".to_string());
        incoming.employee_count = Some(500);

        let merged = merge_company(existing, incoming);
        assert_eq!(merged.headquarters.as_deref(), Some("Lisbon, Portugal"));
        assert_eq!(merged.employee_count, Some(500));
    }
}
