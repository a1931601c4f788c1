/// Schedule policy persistence and next-fire-time computation. The cron math
/// is pure so it can be tested without real clock delays.
use anyhow::Result;
use chrono::{DateTime, Utc};
use cron::Schedule;
use sqlx::SqlitePool;
use std::str::FromStr;
use thiserror::Error;

use crate::db;
use crate::models::schedule::{ScheduleMode, SchedulePolicy};

pub const MIN_INTERVAL_DAYS: i64 = 1;
pub const MAX_INTERVAL_DAYS: i64 = 90;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),
    #[error("cron mode requires a cron expression")]
    MissingCron,
    #[error("interval_days out of range ({MIN_INTERVAL_DAYS}-{MAX_INTERVAL_DAYS}): {0}")]
    IntervalOutOfRange(i64),
    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

impl ScheduleError {
    /// Config validation failures, as opposed to storage trouble
    pub fn is_config(&self) -> bool {
        !matches!(self, Self::Db(_))
    }
}

pub async fn load(pool: &SqlitePool) -> Result<SchedulePolicy> {
    let policy = sqlx::query_as::<_, SchedulePolicy>(
        r#"
        SELECT enabled, mode, interval_days, cron_expr, anchored_at,
               last_run_ts, next_run_ts, last_batch_finished_at, updated_at
        FROM refresh_schedule WHERE id = 1
        "#,
    )
    .fetch_one(pool)
    .await?;
    Ok(policy)
}

#[derive(Debug)]
pub struct PolicyUpdate {
    pub enabled: bool,
    pub mode: ScheduleMode,
    pub interval_days: Option<i64>,
    pub cron_expr: Option<String>,
}

/// Validate and persist a policy update. Rejected updates leave the stored
/// policy untouched. Takes effect on the scheduler's next evaluation tick.
pub async fn save(pool: &SqlitePool, update: PolicyUpdate) -> Result<SchedulePolicy, ScheduleError> {
    let prev = load(pool).await.map_err(ScheduleError::Db)?;

    let interval_days = update.interval_days.unwrap_or(prev.interval_days);
    if !(MIN_INTERVAL_DAYS..=MAX_INTERVAL_DAYS).contains(&interval_days) {
        return Err(ScheduleError::IntervalOutOfRange(interval_days));
    }

    let cron_expr = match update.cron_expr.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(expr) => {
            validate_cron(expr)?;
            Some(expr.to_string())
        }
    };
    if update.mode == ScheduleMode::Cron && cron_expr.is_none() {
        return Err(ScheduleError::MissingCron);
    }

    let now = db::now_epoch();
    // The interval anchor is the moment the policy was switched on
    let anchored_at = if update.enabled && !prev.enabled {
        Some(now)
    } else if !update.enabled {
        None
    } else {
        prev.anchored_at
    };

    sqlx::query(
        r#"
        UPDATE refresh_schedule
        SET enabled = ?, mode = ?, interval_days = ?, cron_expr = ?,
            anchored_at = ?, next_run_ts = NULL, updated_at = ?
        WHERE id = 1
        "#,
    )
    .bind(update.enabled)
    .bind(update.mode.as_str())
    .bind(interval_days)
    .bind(&cron_expr)
    .bind(anchored_at)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| ScheduleError::Db(e.into()))?;

    load(pool).await.map_err(ScheduleError::Db)
}

/// The cron crate wants a seconds field; operators write standard 5-field
/// crontab. Five-field input gets a literal zero-seconds field prepended.
pub fn normalize_cron(expr: &str) -> String {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

pub fn validate_cron(expr: &str) -> Result<Schedule, ScheduleError> {
    Schedule::from_str(&normalize_cron(expr))
        .map_err(|e| ScheduleError::InvalidCron(e.to_string()))
}

/// Next `count` firing times strictly after `from`, as epoch seconds
pub fn preview_cron(
    expr: &str,
    from: DateTime<Utc>,
    count: usize,
) -> Result<Vec<i64>, ScheduleError> {
    let schedule = validate_cron(expr)?;
    Ok(schedule
        .after(&from)
        .take(count)
        .map(|t| t.timestamp())
        .collect())
}

/// Next fire time for the persisted policy. Interval mode runs N days after
/// the last scheduled run (anchored at activation if none); cron mode at the
/// next expression match strictly after `now`.
pub fn next_run(policy: &SchedulePolicy, now: DateTime<Utc>) -> Result<Option<i64>, ScheduleError> {
    if !policy.enabled {
        return Ok(None);
    }
    match ScheduleMode::from_str(&policy.mode) {
        Some(ScheduleMode::Interval) => {
            let anchor = policy
                .last_run_ts
                .or(policy.anchored_at)
                .unwrap_or_else(|| now.timestamp());
            Ok(Some(anchor + policy.interval_days * 86_400))
        }
        Some(ScheduleMode::Cron) => {
            let expr = policy.cron_expr.as_deref().ok_or(ScheduleError::MissingCron)?;
            let schedule = validate_cron(expr)?;
            Ok(schedule.after(&now).next().map(|t| t.timestamp()))
        }
        None => Ok(None),
    }
}

/// Fire time after a skipped firing: recomputed from the current time, not
/// from the missed slot.
pub fn next_run_from(
    policy: &SchedulePolicy,
    from: DateTime<Utc>,
) -> Result<Option<i64>, ScheduleError> {
    if !policy.enabled {
        return Ok(None);
    }
    match ScheduleMode::from_str(&policy.mode) {
        Some(ScheduleMode::Interval) => {
            Ok(Some(from.timestamp() + policy.interval_days * 86_400))
        }
        Some(ScheduleMode::Cron) => {
            let expr = policy.cron_expr.as_deref().ok_or(ScheduleError::MissingCron)?;
            let schedule = validate_cron(expr)?;
            Ok(schedule.after(&from).next().map(|t| t.timestamp()))
        }
        None => Ok(None),
    }
}

pub async fn cache_next_run(pool: &SqlitePool, ts: Option<i64>) -> Result<()> {
    sqlx::query("UPDATE refresh_schedule SET next_run_ts = ? WHERE id = 1")
        .bind(ts)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record completion of a scheduler-initiated run; anchors the next interval
pub async fn record_scheduled_run(pool: &SqlitePool, ts: i64) -> Result<()> {
    sqlx::query("UPDATE refresh_schedule SET last_run_ts = ? WHERE id = 1")
        .bind(ts)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record completion of any batch (manual, retry or scheduled)
pub async fn record_batch_finished(pool: &SqlitePool, ts: i64) -> Result<()> {
    sqlx::query("UPDATE refresh_schedule SET last_batch_finished_at = ? WHERE id = 1")
        .bind(ts)
        .execute(pool)
        .await?;
    Ok(())
}
