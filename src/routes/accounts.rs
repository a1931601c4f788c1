/// Account endpoints. Secrets enter the system here (encrypted on write)
/// and are never serialized back out.
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::crypto::CredentialCipher;
use crate::models::account::Account;
use crate::services::account_service;

/// GET /accounts - List accounts (encrypted fields are skipped by serde)
pub async fn list_accounts(
    State(pool): State<SqlitePool>,
) -> Result<Json<Vec<Account>>, (StatusCode, String)> {
    let accounts = account_service::list_active(&pool)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(accounts))
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// One `email----password----client_id----refresh_token` line per account
    pub accounts: String,
    pub group_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub success: bool,
    pub imported: usize,
    pub skipped: Vec<String>,
    pub invalid: usize,
    pub message: String,
}

/// POST /accounts/import - Bulk import from the export line format
pub async fn import_accounts(
    State(pool): State<SqlitePool>,
    State(cipher): State<CredentialCipher>,
    Json(req): Json<ImportRequest>,
) -> Result<Json<ImportResponse>, (StatusCode, String)> {
    let report = account_service::import_accounts(&pool, &cipher, &req.accounts, req.group_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    tracing::info!(
        imported = report.imported,
        skipped = report.skipped.len(),
        invalid = report.invalid,
        "account import finished"
    );

    let message = format!(
        "imported {}, skipped {}, invalid {}",
        report.imported,
        report.skipped.len(),
        report.invalid
    );
    Ok(Json(ImportResponse {
        success: true,
        imported: report.imported,
        skipped: report.skipped,
        invalid: report.invalid,
        message,
    }))
}
