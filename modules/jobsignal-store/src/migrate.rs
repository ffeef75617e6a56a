//! Idempotent schema setup, run from the worker binary at startup.

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

const STATEMENTS: [&str; 10] = [
    r#"
    CREATE TABLE IF NOT EXISTS queue_items (
        id UUID PRIMARY KEY,
        item_type TEXT NOT NULL,
        status TEXT NOT NULL,
        url TEXT NOT NULL,
        company_name TEXT,
        company_id UUID,
        source_id UUID,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        result_message TEXT,
        error_details TEXT,
        pipeline_stage TEXT,
        pipeline_state JSONB NOT NULL DEFAULT '{}'::jsonb,
        scraped_data JSONB,
        tracking_id UUID NOT NULL,
        ancestry_chain JSONB NOT NULL DEFAULT '[]'::jsonb,
        spawn_depth INT NOT NULL DEFAULT 0,
        max_spawn_depth INT NOT NULL DEFAULT 10,
        parent_item_id UUID,
        attempt_count INT NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_queue_items_status_created ON queue_items (status, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_queue_items_url ON queue_items (url)",
    "CREATE INDEX IF NOT EXISTS idx_queue_items_tracking ON queue_items (tracking_id)",
    r#"
    CREATE TABLE IF NOT EXISTS queue_status_history (
        id BIGSERIAL PRIMARY KEY,
        item_id UUID NOT NULL,
        old_status TEXT NOT NULL,
        new_status TEXT NOT NULL,
        message TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sources (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        source_type TEXT NOT NULL,
        status TEXT NOT NULL,
        config JSONB NOT NULL DEFAULT '{}'::jsonb,
        tags JSONB NOT NULL DEFAULT '[]'::jsonb,
        company_id UUID,
        aggregator_domain TEXT,
        last_scraped_at TIMESTAMPTZ,
        last_error TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_sources_status ON sources (status)",
    "CREATE INDEX IF NOT EXISTS idx_sources_company ON sources (company_id, aggregator_domain)",
    r#"
    CREATE TABLE IF NOT EXISTS companies (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        website TEXT,
        about TEXT,
        culture TEXT,
        mission TEXT,
        headquarters TEXT,
        employee_count INT,
        tech_stack JSONB NOT NULL DEFAULT '[]'::jsonb,
        is_remote_first BOOLEAN NOT NULL DEFAULT false,
        industry TEXT,
        tier TEXT,
        priority_score DOUBLE PRECISION,
        data_quality TEXT NOT NULL DEFAULT 'minimal',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_matches (
        id UUID PRIMARY KEY,
        url TEXT NOT NULL,
        title TEXT NOT NULL,
        company_name TEXT NOT NULL,
        match_score INT NOT NULL,
        breakdown JSONB NOT NULL DEFAULT '{}'::jsonb,
        queue_item_id UUID,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

pub async fn migrate(pool: &PgPool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Schema migration complete");
    Ok(())
}
