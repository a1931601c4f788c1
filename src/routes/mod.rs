use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::crypto::CredentialCipher;
use crate::services::refresh_engine::RefreshEngine;

pub mod accounts;
pub mod history;
pub mod refresh;
pub mod schedule;

pub fn routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    SqlitePool: FromRef<S>,
    Arc<RefreshEngine>: FromRef<S>,
    CredentialCipher: FromRef<S>,
{
    Router::new()
        .route("/accounts", get(accounts::list_accounts))
        .route("/accounts/import", post(accounts::import_accounts))
        .route("/refresh/all", post(refresh::refresh_all))
        .route("/refresh/retry", post(refresh::refresh_retry))
        .route("/refresh/account/:id", post(refresh::refresh_account))
        .route("/refresh/progress", get(refresh::progress_stream))
        .route("/refresh/stats", get(refresh::refresh_stats))
        .route("/history", get(history::list_history))
        .route("/history/failing", get(history::list_failing))
        .route("/history/account/:id", get(history::account_history))
        .route(
            "/schedule",
            get(schedule::get_schedule).put(schedule::update_schedule),
        )
        .route("/schedule/preview", post(schedule::preview_schedule))
}
