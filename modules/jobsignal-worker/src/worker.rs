//! The worker pool: N parallel leaseholders, each running one item to
//! completion before taking another, plus the periodic recovery sweep.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::context::ProcessorContext;
use crate::processors;

/// Idle poll backoff bounds. Jittered so a fleet of workers doesn't hit the
/// queue in lockstep.
const IDLE_MIN_MS: u64 = 750;
const IDLE_MAX_MS: u64 = 2_500;

pub async fn run_worker(
    ctx: Arc<ProcessorContext>,
    worker_id: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(worker_id, "Worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let leased = match ctx.queue.lease_next().await {
            Ok(item) => item,
            Err(e) => {
                warn!(worker_id, error = %e, "Lease poll failed");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        let Some(item) = leased else {
            let idle = Duration::from_millis(rand::rng().random_range(IDLE_MIN_MS..IDLE_MAX_MS));
            tokio::select! {
                _ = tokio::time::sleep(idle) => {}
                _ = shutdown.changed() => {}
            }
            continue;
        };

        if *shutdown.borrow() {
            // Shutting down with a fresh lease: hand the item back instead
            // of processing it.
            abandon_lease(ctx.as_ref(), &item).await;
            break;
        }

        info!(
            worker_id,
            item_id = %item.id,
            item_type = %item.item_type,
            attempt = item.attempt_count,
            "Processing item"
        );
        if let Err(e) = processors::dispatch(ctx.as_ref(), &item).await {
            warn!(worker_id, item_id = %item.id, error = %e, "Dispatch error");
        }
    }

    info!(worker_id, "Worker stopped");
}

/// Voluntary lease abandonment: revert the item to PENDING with its state
/// untouched so another worker picks it up.
async fn abandon_lease(ctx: &ProcessorContext, item: &jobsignal_common::QueueItem) {
    let stage = item.pipeline_stage.clone().unwrap_or_else(|| "resume".to_string());
    if let Err(e) = ctx
        .queue
        .requeue_with_state(item.id, item.pipeline_state.clone(), &stage)
        .await
    {
        warn!(item_id = %item.id, error = %e, "Could not abandon lease");
    }
}

/// Periodic sweep that reclaims leases stuck past the timeout.
pub async fn run_recovery_sweep(
    ctx: Arc<ProcessorContext>,
    lease_timeout_secs: u64,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(interval_secs)) => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            return Ok(());
        }
        match ctx.queue.reclaim_stale(lease_timeout_secs as i64).await {
            Ok(0) => {}
            Ok(reclaimed) => info!(reclaimed, "Recovery sweep reclaimed leases"),
            Err(e) => warn!(error = %e, "Recovery sweep failed"),
        }
    }
}
