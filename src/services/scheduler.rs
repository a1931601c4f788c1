use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::models::refresh_log::AttemptKind;
use crate::services::refresh_engine::{EngineError, RefreshEngine};
use crate::services::schedule_service;

const TICK_SECS: u64 = 30;

/// Starts the background refresh scheduler. Every tick it re-reads the
/// persisted policy, so configuration updates take effect on the next tick.
pub fn start(pool: SqlitePool, engine: Arc<RefreshEngine>) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tick(&pool, &engine).await {
                warn!("scheduler tick failed: {e}");
            }
            tokio::time::sleep(Duration::from_secs(TICK_SECS)).await;
        }
    });
}

async fn tick(pool: &SqlitePool, engine: &Arc<RefreshEngine>) -> Result<()> {
    let policy = schedule_service::load(pool).await?;
    if !policy.enabled {
        if policy.next_run_ts.is_some() {
            schedule_service::cache_next_run(pool, None).await?;
        }
        return Ok(());
    }

    let now = chrono::Utc::now();
    let due = match policy.next_run_ts {
        Some(ts) => ts,
        None => {
            // Fresh policy or just updated: compute and cache the fire time
            match schedule_service::next_run(&policy, now)? {
                Some(ts) => {
                    schedule_service::cache_next_run(pool, Some(ts)).await?;
                    ts
                }
                None => return Ok(()),
            }
        }
    };

    if now.timestamp() < due {
        return Ok(());
    }

    info!(due, "scheduled refresh due, starting batch");
    match engine.run_batch(AttemptKind::Auto).await {
        Ok(summary) => {
            schedule_service::record_scheduled_run(pool, summary.finished_at).await?;
            let policy = schedule_service::load(pool).await?;
            let next = schedule_service::next_run(&policy, chrono::Utc::now())?;
            schedule_service::cache_next_run(pool, next).await?;
        }
        Err(EngineError::Busy) => {
            // A manual run got there first. Skip this firing and recompute
            // the following one from the current time instead of queuing.
            warn!("scheduled refresh skipped: a run is already in progress");
            let next = schedule_service::next_run_from(&policy, chrono::Utc::now())?;
            schedule_service::cache_next_run(pool, next).await?;
        }
        Err(e) => {
            warn!(error = %e, "scheduled refresh failed");
            let next = schedule_service::next_run_from(&policy, chrono::Utc::now())?;
            schedule_service::cache_next_run(pool, next).await?;
        }
    }

    Ok(())
}
