/// Refresh run endpoints: start batches, watch progress, read statistics
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::models::refresh_log::AttemptKind;
use crate::services::refresh_engine::{AccountOutcome, EngineError, RefreshEngine, RunState};
use crate::services::{account_service, schedule_service};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunResponse {
    pub success: bool,
    pub run_id: i64,
    pub total: u32,
    pub message: String,
}

fn engine_error(e: EngineError) -> (StatusCode, String) {
    match e {
        EngineError::Busy => (StatusCode::CONFLICT, e.to_string()),
        EngineError::AccountNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        EngineError::Internal(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

/// POST /refresh/all - Start a refresh run over every account
pub async fn refresh_all(
    State(engine): State<Arc<RefreshEngine>>,
) -> Result<Json<StartRunResponse>, (StatusCode, String)> {
    let started = engine
        .start_batch(AttemptKind::Manual)
        .await
        .map_err(engine_error)?;
    tracing::info!(run_id = started.run_id, total = started.total, "manual refresh started");
    Ok(Json(StartRunResponse {
        success: true,
        run_id: started.run_id,
        total: started.total,
        message: format!("refresh started for {} accounts", started.total),
    }))
}

/// POST /refresh/retry - Re-attempt only the currently failing accounts
pub async fn refresh_retry(
    State(engine): State<Arc<RefreshEngine>>,
) -> Result<Json<StartRunResponse>, (StatusCode, String)> {
    let started = engine
        .start_batch(AttemptKind::Retry)
        .await
        .map_err(engine_error)?;
    tracing::info!(run_id = started.run_id, total = started.total, "retry refresh started");
    Ok(Json(StartRunResponse {
        success: true,
        run_id: started.run_id,
        total: started.total,
        message: format!("retry started for {} failing accounts", started.total),
    }))
}

#[derive(Debug, Deserialize, Default)]
pub struct RefreshOneQuery {
    pub kind: Option<String>,
}

/// POST /refresh/account/:id - Refresh a single account, synchronously
pub async fn refresh_account(
    State(engine): State<Arc<RefreshEngine>>,
    Path(account_id): Path<String>,
    Query(q): Query<RefreshOneQuery>,
) -> Result<Json<AccountOutcome>, (StatusCode, String)> {
    // single refreshes are operator actions: manual unless marked retry
    let kind = match q.kind.as_deref() {
        Some("retry") => AttemptKind::Retry,
        _ => AttemptKind::Manual,
    };
    let outcome = engine
        .refresh_one(&account_id, kind)
        .await
        .map_err(engine_error)?;
    Ok(Json(outcome))
}

/// GET /refresh/progress - SSE feed of the live run
pub async fn progress_stream(
    State(engine): State<Arc<RefreshEngine>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = engine.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().data(json));
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Slow consumer: events were dropped, the run is unaffected
                    tracing::warn!(skipped, "progress consumer lagging");
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshStats {
    pub total_accounts: i64,
    pub success_count: i64,
    pub failed_count: i64,
    pub unknown_count: i64,
    pub last_batch_finished_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_run: Option<RunState>,
}

/// GET /refresh/stats - Fleet-level refresh statistics
pub async fn refresh_stats(
    State(pool): State<SqlitePool>,
    State(engine): State<Arc<RefreshEngine>>,
) -> Result<Json<RefreshStats>, (StatusCode, String)> {
    let counts = account_service::status_counts(&pool)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let policy = schedule_service::load(&pool)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(RefreshStats {
        total_accounts: counts.total,
        success_count: counts.success,
        failed_count: counts.failed,
        unknown_count: counts.unknown,
        last_batch_finished_at: policy.last_batch_finished_at,
        active_run: engine.current_run().await,
    }))
}
