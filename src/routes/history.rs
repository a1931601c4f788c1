/// Refresh history endpoints
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db;
use crate::models::refresh_log::RefreshLogEntry;
use crate::services::history_service;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<i64>,
    pub failed_only: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<RefreshLogEntry>,
    pub total: usize,
}

/// GET /history - Paged refresh history, most recent first
pub async fn list_history(
    State(pool): State<SqlitePool>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, (StatusCode, String)> {
    let days = q.days.unwrap_or(history_service::RETENTION_DAYS).max(0);
    let cutoff = db::now_epoch() - days * 86_400;
    let limit = q.limit.unwrap_or(100).min(500) as i64;
    let offset = q.offset.unwrap_or(0) as i64;

    let entries = history_service::list_since(
        &pool,
        cutoff,
        limit,
        offset,
        q.failed_only.unwrap_or(false),
    )
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let total = entries.len();
    Ok(Json(HistoryResponse { entries, total }))
}

/// GET /history/failing - Accounts whose latest attempt failed
pub async fn list_failing(
    State(pool): State<SqlitePool>,
) -> Result<Json<HistoryResponse>, (StatusCode, String)> {
    let entries = history_service::list_failed_current(&pool)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let total = entries.len();
    Ok(Json(HistoryResponse { entries, total }))
}

/// GET /history/account/:id - Refresh history of a single account
pub async fn account_history(
    State(pool): State<SqlitePool>,
    Path(account_id): Path<String>,
) -> Result<Json<HistoryResponse>, (StatusCode, String)> {
    let entries = history_service::list_for_account(&pool, &account_id, 100)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let total = entries.len();
    Ok(Json(HistoryResponse { entries, total }))
}
