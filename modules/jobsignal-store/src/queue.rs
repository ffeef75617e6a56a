//! Durable work queue with compare-and-swap leases, requeue-with-state, and
//! spawn safety.
//!
//! The queue manager exclusively owns the `queue_items` table; processors
//! never write it directly. Every status change is validated against the
//! transition table and audited in `queue_status_history`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use jobsignal_common::{
    JobSignalError, NewQueueItem, QueueItem, QueueItemType, QueueStatus, DEFAULT_MAX_SPAWN_DEPTH,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

const ITEM_COLUMNS: &str = "id, item_type, status, url, company_name, company_id, source_id, \
     created_at, updated_at, result_message, error_details, pipeline_stage, pipeline_state, \
     scraped_data, tracking_id, ancestry_chain, spawn_depth, max_spawn_depth, parent_item_id, \
     attempt_count";

#[derive(Clone)]
pub struct QueueManager {
    pool: PgPool,
}

/// Optional fields carried along with a status update.
#[derive(Debug, Default)]
pub struct StatusUpdate {
    pub message: Option<String>,
    pub scraped_data: Option<serde_json::Value>,
    pub error_details: Option<String>,
    pub pipeline_stage: Option<String>,
}

impl StatusUpdate {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.pipeline_stage = Some(stage.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_details = Some(error.into());
        self
    }

    pub fn with_scraped_data(mut self, data: serde_json::Value) -> Self {
        self.scraped_data = Some(data);
        self
    }
}

impl QueueManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue new work. Assigns identity, a tracking id when absent, and
    /// zeroed spawn bookkeeping.
    pub async fn add_item(&self, item: NewQueueItem) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let item_type = item
            .item_type
            .ok_or_else(|| JobSignalError::Validation("queue item requires a type".into()))?;
        let tracking_id = item.tracking_id.unwrap_or_else(Uuid::new_v4);
        let pipeline_state = item
            .pipeline_state
            .unwrap_or_else(|| serde_json::json!({}));

        sqlx::query(
            r#"
            INSERT INTO queue_items
                (id, item_type, status, url, company_name, company_id, source_id,
                 pipeline_stage, pipeline_state, scraped_data, tracking_id,
                 ancestry_chain, spawn_depth, max_spawn_depth, attempt_count)
            VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7, $8, $9, $10, '[]'::jsonb, 0, $11, 0)
            "#,
        )
        .bind(id)
        .bind(item_type.to_string())
        .bind(&item.url)
        .bind(&item.company_name)
        .bind(item.company_id)
        .bind(item.source_id)
        .bind(&item.pipeline_stage)
        .bind(&pipeline_state)
        .bind(&item.scraped_data)
        .bind(tracking_id)
        .bind(item.max_spawn_depth.unwrap_or(DEFAULT_MAX_SPAWN_DEPTH))
        .execute(&self.pool)
        .await?;

        info!(item_id = %id, item_type = %item_type, url = %item.url, "Enqueued item");
        Ok(id)
    }

    pub async fn get_item(&self, id: Uuid) -> Result<Option<QueueItem>> {
        let row = sqlx::query_as::<_, QueueItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM queue_items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(QueueItemRow::into_item).transpose()
    }

    /// Lease the oldest PENDING item. The transition to PROCESSING is a
    /// conditional update, so exactly one worker wins each item.
    pub async fn lease_next(&self) -> Result<Option<QueueItem>> {
        let row = sqlx::query_as::<_, QueueItemRow>(&format!(
            r#"
            UPDATE queue_items SET status = 'processing', updated_at = now()
            WHERE id = (
                SELECT id FROM queue_items
                WHERE status = 'pending'
                ORDER BY created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            ) AND status = 'pending'
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .fetch_optional(&self.pool)
        .await?;

        let item = row.map(QueueItemRow::into_item).transpose()?;
        if let Some(ref item) = item {
            self.record_history(item.id, QueueStatus::Pending, QueueStatus::Processing, None)
                .await?;
        }
        Ok(item)
    }

    /// Update an item's status. Transitions are validated; the requeue edge
    /// (PROCESSING -> PENDING) additionally requires a pipeline stage.
    pub async fn update_status(
        &self,
        id: Uuid,
        new_status: QueueStatus,
        update: StatusUpdate,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, (String,)>(
            "SELECT status FROM queue_items WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((current,)) = row else {
            return Err(JobSignalError::Database(format!("queue item {id} not found")).into());
        };
        let old_status: QueueStatus = current.parse().map_err(JobSignalError::Database)?;

        if !QueueStatus::can_transition(old_status, new_status) {
            return Err(JobSignalError::InvalidStateTransition {
                from: old_status.to_string(),
                to: new_status.to_string(),
            }
            .into());
        }
        if old_status == QueueStatus::Processing
            && new_status == QueueStatus::Pending
            && update.pipeline_stage.is_none()
        {
            return Err(JobSignalError::InvalidStateTransition {
                from: "processing".to_string(),
                to: "pending (requeue requires pipeline_stage)".to_string(),
            }
            .into());
        }

        sqlx::query(
            r#"
            UPDATE queue_items SET
                status = $2,
                updated_at = now(),
                result_message = COALESCE($3, result_message),
                scraped_data = COALESCE($4, scraped_data),
                error_details = COALESCE($5, error_details),
                pipeline_stage = COALESCE($6, pipeline_stage)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(new_status.to_string())
        .bind(&update.message)
        .bind(&update.scraped_data)
        .bind(&update.error_details)
        .bind(&update.pipeline_stage)
        .execute(&mut *tx)
        .await?;

        insert_history(&mut tx, id, old_status, new_status, update.message.as_deref()).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Atomically requeue a PROCESSING item with replaced pipeline state and
    /// a new stage. The same item id advances through stages.
    pub async fn requeue_with_state(
        &self,
        id: Uuid,
        new_state: serde_json::Value,
        next_stage: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE queue_items SET
                status = 'pending',
                pipeline_state = $2,
                pipeline_stage = $3,
                updated_at = now()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(&new_state)
        .bind(next_stage)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(JobSignalError::InvalidStateTransition {
                from: "non-processing".to_string(),
                to: format!("pending (stage {next_stage})"),
            }
            .into());
        }

        self.record_history(
            id,
            QueueStatus::Processing,
            QueueStatus::Pending,
            Some(&format!("requeued at stage {next_stage}")),
        )
        .await?;
        Ok(())
    }

    /// Spawn a child item from within a processor, refusing depth overflow,
    /// duplicate live work, and ancestry cycles. All checks and the insert
    /// run in one transaction. Returns None when the spawn is refused.
    pub async fn spawn_item_safely(
        &self,
        parent: &QueueItem,
        child: NewQueueItem,
    ) -> Result<Option<Uuid>> {
        let child_type = child
            .item_type
            .ok_or_else(|| JobSignalError::Validation("spawned item requires a type".into()))?;

        if parent.spawn_depth >= parent.max_spawn_depth {
            warn!(
                parent_id = %parent.id,
                depth = parent.spawn_depth,
                "Spawn refused: max depth reached"
            );
            return Ok(None);
        }

        let mut tx = self.pool.begin().await?;

        // An equivalent live item means this work is already in flight.
        let duplicate = sqlx::query_as::<_, (i32,)>(
            r#"
            SELECT 1 FROM queue_items
            WHERE item_type = $1 AND url = $2
              AND company_id IS NOT DISTINCT FROM $3
              AND status IN ('pending', 'processing')
            LIMIT 1
            "#,
        )
        .bind(child_type.to_string())
        .bind(&child.url)
        .bind(child.company_id)
        .fetch_optional(&mut *tx)
        .await?;
        if duplicate.is_some() {
            info!(
                parent_id = %parent.id,
                child_type = %child_type,
                url = %child.url,
                "Spawn refused: equivalent live item"
            );
            return Ok(None);
        }

        // A child that repeats an ancestor's work would loop forever.
        let mut lineage = parent.ancestry_chain.clone();
        lineage.push(parent.id);
        let cycle = sqlx::query_as::<_, (i32,)>(
            r#"
            SELECT 1 FROM queue_items
            WHERE id = ANY($1) AND item_type = $2 AND url = $3
            LIMIT 1
            "#,
        )
        .bind(&lineage)
        .bind(child_type.to_string())
        .bind(&child.url)
        .fetch_optional(&mut *tx)
        .await?;
        if cycle.is_some() {
            warn!(
                parent_id = %parent.id,
                child_type = %child_type,
                url = %child.url,
                "Spawn refused: cycle detected in ancestry"
            );
            return Ok(None);
        }

        let id = Uuid::new_v4();
        let ancestry = ancestry_for_child(parent);
        let pipeline_state = child
            .pipeline_state
            .unwrap_or_else(|| serde_json::json!({}));

        sqlx::query(
            r#"
            INSERT INTO queue_items
                (id, item_type, status, url, company_name, company_id, source_id,
                 pipeline_stage, pipeline_state, scraped_data, tracking_id,
                 ancestry_chain, spawn_depth, max_spawn_depth, parent_item_id, attempt_count)
            VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 0)
            "#,
        )
        .bind(id)
        .bind(child_type.to_string())
        .bind(&child.url)
        .bind(&child.company_name)
        .bind(child.company_id)
        .bind(child.source_id)
        .bind(&child.pipeline_stage)
        .bind(&pipeline_state)
        .bind(&child.scraped_data)
        .bind(parent.tracking_id)
        .bind(serde_json::to_value(&ancestry)?)
        .bind(parent.spawn_depth + 1)
        .bind(parent.max_spawn_depth)
        .bind(parent.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(
            parent_id = %parent.id,
            child_id = %id,
            child_type = %child_type,
            depth = parent.spawn_depth + 1,
            "Spawned child item"
        );
        Ok(Some(id))
    }

    /// Fast duplicate check used by intake before enqueueing postings.
    pub async fn url_exists_in_queue(&self, url: &str) -> Result<bool> {
        let row = sqlx::query_as::<_, (i32,)>("SELECT 1 FROM queue_items WHERE url = $1 LIMIT 1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Recovery sweep: revert items stuck in PROCESSING past the lease
    /// timeout to PENDING with an incremented attempt counter.
    pub async fn reclaim_stale(&self, lease_timeout_secs: i64) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::seconds(lease_timeout_secs);
        let result = sqlx::query(
            r#"
            UPDATE queue_items SET
                status = 'pending',
                attempt_count = attempt_count + 1,
                updated_at = now()
            WHERE status = 'processing' AND updated_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let reclaimed = result.rows_affected();
        if reclaimed > 0 {
            warn!(reclaimed, "Reclaimed stale processing leases");
        }
        Ok(reclaimed)
    }

    /// Items sharing a tracking id, ordered by creation (the spawn tree).
    pub async fn items_by_tracking_id(&self, tracking_id: Uuid) -> Result<Vec<QueueItem>> {
        let rows = sqlx::query_as::<_, QueueItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM queue_items WHERE tracking_id = $1 ORDER BY created_at"
        ))
        .bind(tracking_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QueueItemRow::into_item).collect()
    }

    pub async fn pending_count(&self) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM queue_items WHERE status = 'pending'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn record_history(
        &self,
        item_id: Uuid,
        old: QueueStatus,
        new: QueueStatus,
        message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO queue_status_history (item_id, old_status, new_status, message) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(item_id)
        .bind(old.to_string())
        .bind(new.to_string())
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn insert_history(
    tx: &mut Transaction<'_, Postgres>,
    item_id: Uuid,
    old: QueueStatus,
    new: QueueStatus,
    message: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO queue_status_history (item_id, old_status, new_status, message) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(item_id)
    .bind(old.to_string())
    .bind(new.to_string())
    .bind(message)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// The child's ancestry is its parent prepended to the parent's chain, so
/// `len(chain) == spawn_depth` holds by construction.
pub fn ancestry_for_child(parent: &QueueItem) -> Vec<Uuid> {
    let mut chain = Vec::with_capacity(parent.ancestry_chain.len() + 1);
    chain.push(parent.id);
    chain.extend(parent.ancestry_chain.iter().copied());
    chain
}

/// Row shape of `queue_items`. Status and type are wire strings and the
/// ancestry chain is JSONB, so the domain type is built via `into_item`.
#[derive(FromRow)]
struct QueueItemRow {
    id: Uuid,
    item_type: String,
    status: String,
    url: String,
    company_name: Option<String>,
    company_id: Option<Uuid>,
    source_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    result_message: Option<String>,
    error_details: Option<String>,
    pipeline_stage: Option<String>,
    pipeline_state: serde_json::Value,
    scraped_data: Option<serde_json::Value>,
    tracking_id: Uuid,
    ancestry_chain: serde_json::Value,
    spawn_depth: i32,
    max_spawn_depth: i32,
    parent_item_id: Option<Uuid>,
    attempt_count: i32,
}

impl QueueItemRow {
    fn into_item(self) -> Result<QueueItem> {
        let item_type: QueueItemType =
            self.item_type.parse().map_err(JobSignalError::Database)?;
        let status: QueueStatus = self.status.parse().map_err(JobSignalError::Database)?;
        let ancestry_chain: Vec<Uuid> = serde_json::from_value(self.ancestry_chain)?;

        Ok(QueueItem {
            id: self.id,
            item_type,
            status,
            url: self.url,
            company_name: self.company_name,
            company_id: self.company_id,
            source_id: self.source_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            result_message: self.result_message,
            error_details: self.error_details,
            pipeline_stage: self.pipeline_stage,
            pipeline_state: self.pipeline_state,
            scraped_data: self.scraped_data,
            tracking_id: self.tracking_id,
            ancestry_chain,
            spawn_depth: self.spawn_depth,
            max_spawn_depth: self.max_spawn_depth,
            parent_item_id: self.parent_item_id,
            attempt_count: self.attempt_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(depth: i32, max_depth: i32) -> QueueItem {
        QueueItem {
            id: Uuid::new_v4(),
            item_type: QueueItemType::Job,
            status: QueueStatus::Processing,
            url: "https://example.com/jobs/1".to_string(),
            company_name: None,
            company_id: None,
            source_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            result_message: None,
            error_details: None,
            pipeline_stage: None,
            pipeline_state: serde_json::json!({}),
            scraped_data: None,
            tracking_id: Uuid::new_v4(),
            ancestry_chain: (0..depth).map(|_| Uuid::new_v4()).collect(),
            spawn_depth: depth,
            max_spawn_depth: max_depth,
            parent_item_id: None,
            attempt_count: 0,
        }
    }

    #[test]
    fn ancestry_prepends_parent_and_tracks_depth() {
        let parent = item(2, 10);
        let chain = ancestry_for_child(&parent);
        assert_eq!(chain.len(), 3, "child depth = parent depth + 1");
        assert_eq!(chain[0], parent.id, "parent id is prepended");
        assert_eq!(&chain[1..], parent.ancestry_chain.as_slice());
    }

    #[test]
    fn ancestry_len_matches_spawn_depth_invariant() {
        for depth in 0..5 {
            let parent = item(depth, 10);
            assert_eq!(parent.ancestry_chain.len() as i32, parent.spawn_depth);
            assert_eq!(
                ancestry_for_child(&parent).len() as i32,
                parent.spawn_depth + 1
            );
        }
    }
}
