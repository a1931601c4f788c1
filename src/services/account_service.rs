/// Credential store access. The only writer of refresh status and timestamp
/// is the refresh engine, through update_refresh_state.
use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::crypto::CredentialCipher;
use crate::db;
use crate::models::account::{parse_account_line, Account, RefreshStatus};

/// Add a new account with encrypted credential material
pub async fn add_account(
    pool: &SqlitePool,
    cipher: &CredentialCipher,
    email: &str,
    client_id: &str,
    refresh_token: &str,
    group_id: Option<i64>,
    remark: Option<&str>,
) -> Result<Account> {
    let id = Account::generate_id(email);

    let existing = sqlx::query_scalar::<_, String>("SELECT id FROM accounts WHERE id = ?")
        .bind(&id)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        anyhow::bail!("Account already exists: {}", email);
    }

    let client_id_enc = cipher.encrypt(client_id)?;
    let refresh_token_enc = cipher.encrypt(refresh_token)?;
    let now = db::now_epoch();

    sqlx::query(
        r#"
        INSERT INTO accounts (
            id, email, client_id_enc, refresh_token_enc,
            group_id, remark, refresh_status,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, 'unknown', ?, ?)
        "#,
    )
    .bind(&id)
    .bind(email)
    .bind(&client_id_enc)
    .bind(&refresh_token_enc)
    .bind(group_id)
    .bind(remark)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(Account {
        id,
        email: email.to_string(),
        client_id_enc,
        refresh_token_enc,
        group_id,
        remark: remark.map(|s| s.to_string()),
        refresh_status: RefreshStatus::Unknown.as_str().to_string(),
        last_refresh_ts: None,
        created_at: now,
        updated_at: now,
    })
}

/// All accounts in stable batch order (ascending id)
pub async fn list_active(pool: &SqlitePool) -> Result<Vec<Account>> {
    let accounts = sqlx::query_as::<_, Account>("SELECT * FROM accounts ORDER BY id ASC")
        .fetch_all(pool)
        .await?;
    Ok(accounts)
}

pub async fn get_account(pool: &SqlitePool, account_id: &str) -> Result<Option<Account>> {
    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
        .bind(account_id)
        .fetch_optional(pool)
        .await?;
    Ok(account)
}

pub async fn get_by_email(pool: &SqlitePool, email: &str) -> Result<Option<Account>> {
    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(account)
}

/// Fetch a subset of accounts, keeping the stable ascending-id order
pub async fn get_many(pool: &SqlitePool, ids: &[String]) -> Result<Vec<Account>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("SELECT * FROM accounts WHERE id IN ({placeholders}) ORDER BY id ASC");
    let mut query = sqlx::query_as::<_, Account>(&sql);
    for id in ids {
        query = query.bind(id);
    }
    Ok(query.fetch_all(pool).await?)
}

/// Record the outcome of the most recent refresh attempt
pub async fn update_refresh_state(
    pool: &SqlitePool,
    account_id: &str,
    status: RefreshStatus,
    ts: i64,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE accounts SET refresh_status = ?, last_refresh_ts = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(ts)
    .bind(ts)
    .bind(account_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Persist a rotated refresh secret (already encrypted)
pub async fn update_refresh_secret(
    pool: &SqlitePool,
    account_id: &str,
    refresh_token_enc: &str,
) -> Result<()> {
    sqlx::query("UPDATE accounts SET refresh_token_enc = ?, updated_at = ? WHERE id = ?")
        .bind(refresh_token_enc)
        .bind(db::now_epoch())
        .bind(account_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: Vec<String>,
    pub invalid: usize,
}

/// Bulk import from the `email----password----client_id----refresh_token`
/// line format. Existing emails are skipped, unparseable lines counted.
pub async fn import_accounts(
    pool: &SqlitePool,
    cipher: &CredentialCipher,
    blob: &str,
    group_id: Option<i64>,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for line in blob.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(cred) = parse_account_line(line) else {
            report.invalid += 1;
            continue;
        };
        if get_by_email(pool, &cred.email).await?.is_some() {
            report.skipped.push(cred.email);
            continue;
        }
        add_account(
            pool,
            cipher,
            &cred.email,
            &cred.client_id,
            &cred.refresh_token,
            group_id,
            None,
        )
        .await?;
        report.imported += 1;
    }
    Ok(report)
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub total: i64,
    pub success: i64,
    pub failed: i64,
    pub unknown: i64,
}

pub async fn status_counts(pool: &SqlitePool) -> Result<StatusCounts> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT refresh_status, COUNT(*) FROM accounts GROUP BY refresh_status",
    )
    .fetch_all(pool)
    .await?;

    let mut counts = StatusCounts::default();
    for (status, n) in rows {
        counts.total += n;
        match RefreshStatus::from_str(&status) {
            RefreshStatus::Success => counts.success += n,
            RefreshStatus::Failed => counts.failed += n,
            RefreshStatus::Unknown => counts.unknown += n,
        }
    }
    Ok(counts)
}
