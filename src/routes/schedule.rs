/// Schedule policy endpoints
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::models::schedule::{ScheduleMode, SchedulePolicy};
use crate::services::schedule_service::{self, PolicyUpdate};

/// GET /schedule - Current schedule policy
pub async fn get_schedule(
    State(pool): State<SqlitePool>,
) -> Result<Json<SchedulePolicy>, (StatusCode, String)> {
    let policy = schedule_service::load(&pool)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(policy))
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleRequest {
    pub enabled: bool,
    pub mode: String,
    pub interval_days: Option<i64>,
    pub cron_expr: Option<String>,
}

/// PUT /schedule - Update the schedule policy (effective on the next tick)
pub async fn update_schedule(
    State(pool): State<SqlitePool>,
    Json(req): Json<UpdateScheduleRequest>,
) -> Result<Json<SchedulePolicy>, (StatusCode, String)> {
    let mode = ScheduleMode::from_str(&req.mode).ok_or_else(|| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("unknown mode: {}", req.mode),
        )
    })?;

    let update = PolicyUpdate {
        enabled: req.enabled,
        mode,
        interval_days: req.interval_days,
        cron_expr: req.cron_expr,
    };

    match schedule_service::save(&pool, update).await {
        Ok(policy) => {
            tracing::info!(enabled = policy.enabled, mode = %policy.mode, "schedule policy updated");
            Ok(Json(policy))
        }
        Err(e) if e.is_config() => Err((StatusCode::UNPROCESSABLE_ENTITY, e.to_string())),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub cron_expr: String,
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub valid: bool,
    pub next_times: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /schedule/preview - Validate a cron expression without persisting it
pub async fn preview_schedule(Json(req): Json<PreviewRequest>) -> Json<PreviewResponse> {
    let count = req.count.unwrap_or(5).min(20);
    match schedule_service::preview_cron(&req.cron_expr, Utc::now(), count) {
        Ok(next_times) => Json(PreviewResponse {
            valid: true,
            next_times,
            error: None,
        }),
        Err(e) => Json(PreviewResponse {
            valid: false,
            next_times: Vec::new(),
            error: Some(e.to_string()),
        }),
    }
}
