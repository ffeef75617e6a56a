//! Persisted job matches: the durable output of the JOB pipeline.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct JobMatch {
    pub id: Uuid,
    pub url: String,
    pub title: String,
    pub company_name: String,
    pub match_score: i32,
    pub breakdown: serde_json::Value,
    pub queue_item_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct MatchStore {
    pool: PgPool,
}

impl MatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn save(
        &self,
        url: &str,
        title: &str,
        company_name: &str,
        match_score: i32,
        breakdown: &serde_json::Value,
        queue_item_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO job_matches
                (id, url, title, company_name, match_score, breakdown, queue_item_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(url)
        .bind(title)
        .bind(company_name)
        .bind(match_score)
        .bind(breakdown)
        .bind(queue_item_id)
        .execute(&self.pool)
        .await?;

        info!(match_id = %id, url, match_score, "Saved job match");
        Ok(id)
    }

    pub async fn get_by_url(&self, url: &str) -> Result<Option<JobMatch>> {
        let row = sqlx::query_as::<_, JobMatch>(
            "SELECT id, url, title, company_name, match_score, breakdown, queue_item_id, \
             created_at FROM job_matches WHERE url = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn count_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM job_matches WHERE created_at >= $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}
