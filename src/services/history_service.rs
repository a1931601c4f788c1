/// History ledger: append-only record of refresh attempts with retention
/// pruning. Entry ids are monotonic, so "latest per account" is MAX(id).
use anyhow::Result;
use sqlx::SqlitePool;

use crate::db;
use crate::models::refresh_log::{AttemptKind, Outcome, RefreshLogEntry};

pub const RETENTION_DAYS: i64 = 180;
pub const RETENTION_MAX_ENTRIES: i64 = 1000;

pub async fn append(
    pool: &SqlitePool,
    account_id: &str,
    email: &str,
    kind: AttemptKind,
    outcome: Outcome,
    error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO refresh_log (account_id, email, kind, outcome, error, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(account_id)
    .bind(email)
    .bind(kind.as_str())
    .bind(outcome.as_str())
    .bind(error)
    .bind(db::now_epoch())
    .execute(pool)
    .await?;
    Ok(())
}

/// Paged listing, most recent first
pub async fn list_since(
    pool: &SqlitePool,
    cutoff_ts: i64,
    limit: i64,
    offset: i64,
    failed_only: bool,
) -> Result<Vec<RefreshLogEntry>> {
    let outcome_filter = if failed_only {
        "AND outcome = 'failed'"
    } else {
        ""
    };
    let sql = format!(
        "SELECT * FROM refresh_log WHERE created_at >= ? {outcome_filter} \
         ORDER BY id DESC LIMIT ? OFFSET ?"
    );
    let entries = sqlx::query_as::<_, RefreshLogEntry>(&sql)
        .bind(cutoff_ts)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    Ok(entries)
}

pub async fn list_for_account(
    pool: &SqlitePool,
    account_id: &str,
    limit: i64,
) -> Result<Vec<RefreshLogEntry>> {
    let entries = sqlx::query_as::<_, RefreshLogEntry>(
        "SELECT * FROM refresh_log WHERE account_id = ? ORDER BY id DESC LIMIT ?",
    )
    .bind(account_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

/// Accounts whose single most recent entry is a failure. Derived, not stored:
/// an account that failed historically but succeeded since does not appear.
pub async fn list_failed_current(pool: &SqlitePool) -> Result<Vec<RefreshLogEntry>> {
    let entries = sqlx::query_as::<_, RefreshLogEntry>(
        r#"
        SELECT l.* FROM refresh_log l
        JOIN (SELECT account_id, MAX(id) AS max_id FROM refresh_log GROUP BY account_id) latest
          ON l.id = latest.max_id
        WHERE l.outcome = 'failed'
        ORDER BY l.account_id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

/// Retention pruning. The age window fires first, then the count cap on what
/// remains; neither pass may delete an account's most recent entry, so the
/// currently-failing view stays correct under aggressive pruning.
pub async fn prune(pool: &SqlitePool, window_days: i64, max_entries: i64) -> Result<u64> {
    let cutoff = db::now_epoch() - window_days * 86_400;

    let mut removed = sqlx::query(
        r#"
        DELETE FROM refresh_log
        WHERE created_at < ?
          AND id NOT IN (SELECT MAX(id) FROM refresh_log GROUP BY account_id)
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?
    .rows_affected();

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM refresh_log")
        .fetch_one(pool)
        .await?;
    let excess = total - max_entries;
    if excess > 0 {
        removed += sqlx::query(
            r#"
            DELETE FROM refresh_log
            WHERE id IN (
                SELECT id FROM refresh_log
                WHERE id NOT IN (SELECT MAX(id) FROM refresh_log GROUP BY account_id)
                ORDER BY id ASC
                LIMIT ?
            )
            "#,
        )
        .bind(excess)
        .execute(pool)
        .await?
        .rows_affected();
    }

    Ok(removed)
}
