mod common;

use common::test_pool;
use outlook_token_hub::db;
use outlook_token_hub::models::refresh_log::{AttemptKind, Outcome};
use outlook_token_hub::services::history_service;
use sqlx::SqlitePool;

async fn insert_entry(pool: &SqlitePool, account_id: &str, outcome: &str, created_at: i64) {
    sqlx::query(
        "INSERT INTO refresh_log (account_id, email, kind, outcome, error, created_at) \
         VALUES (?, ?, 'auto', ?, NULL, ?)",
    )
    .bind(account_id)
    .bind(format!("{account_id}@outlook.com"))
    .bind(outcome)
    .bind(created_at)
    .execute(pool)
    .await
    .unwrap();
}

async fn count_entries(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM refresh_log")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn latest_entry_decides_failing_list() {
    let pool = test_pool().await;

    // A failed once, then recovered
    history_service::append(&pool, "acc_a", "a@outlook.com", AttemptKind::Manual, Outcome::Failed, Some("timed out"))
        .await
        .unwrap();
    history_service::append(&pool, "acc_a", "a@outlook.com", AttemptKind::Retry, Outcome::Success, None)
        .await
        .unwrap();
    // B succeeded once, then broke
    history_service::append(&pool, "acc_b", "b@outlook.com", AttemptKind::Manual, Outcome::Success, None)
        .await
        .unwrap();
    history_service::append(&pool, "acc_b", "b@outlook.com", AttemptKind::Auto, Outcome::Failed, Some("re-authorization required: invalid_grant"))
        .await
        .unwrap();

    let failing = history_service::list_failed_current(&pool).await.unwrap();
    assert_eq!(failing.len(), 1);
    assert_eq!(failing[0].account_id, "acc_b");
    assert_eq!(failing[0].outcome, "failed");
}

#[tokio::test]
async fn prune_window_never_removes_latest_entry_per_account() {
    let pool = test_pool().await;
    let now = db::now_epoch();
    let old = now - 200 * 86_400;

    // stale account: one ancient entry, still its latest
    insert_entry(&pool, "acc_stale", "failed", old).await;
    // active account: one ancient entry and one fresh
    insert_entry(&pool, "acc_active", "failed", old).await;
    insert_entry(&pool, "acc_active", "success", now - 10 * 86_400).await;

    let removed = history_service::prune(&pool, 180, 1000).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(count_entries(&pool).await, 2);

    // the stale account still shows up as currently failing
    let failing = history_service::list_failed_current(&pool).await.unwrap();
    assert_eq!(failing.len(), 1);
    assert_eq!(failing[0].account_id, "acc_stale");
}

#[tokio::test]
async fn prune_caps_total_entries_oldest_first() {
    let pool = test_pool().await;
    let now = db::now_epoch();

    // 30 fresh entries alternating across two accounts
    for i in 0..30 {
        let account = if i % 2 == 0 { "acc_x" } else { "acc_y" };
        insert_entry(&pool, account, "success", now - (30 - i) * 60).await;
    }

    let removed = history_service::prune(&pool, 180, 10).await.unwrap();
    assert_eq!(removed, 20);
    assert_eq!(count_entries(&pool).await, 10);

    // the survivors are the newest entries
    let oldest_kept: i64 = sqlx::query_scalar("SELECT MIN(id) FROM refresh_log")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!(oldest_kept > 20);
}

#[tokio::test]
async fn listing_pages_most_recent_first() {
    let pool = test_pool().await;
    let now = db::now_epoch();

    for i in 0..5 {
        let outcome = if i == 3 { "failed" } else { "success" };
        insert_entry(&pool, "acc_p", outcome, now - (5 - i) * 60).await;
    }

    let page = history_service::list_since(&pool, 0, 2, 0, false).await.unwrap();
    assert_eq!(page.len(), 2);
    assert!(page[0].id > page[1].id);

    let next_page = history_service::list_since(&pool, 0, 2, 2, false).await.unwrap();
    assert_eq!(next_page.len(), 2);
    assert!(next_page[0].id < page[1].id);

    let failed_only = history_service::list_since(&pool, 0, 10, 0, true).await.unwrap();
    assert_eq!(failed_only.len(), 1);
    assert_eq!(failed_only[0].outcome, "failed");

    // cutoff excludes older entries
    let recent = history_service::list_since(&pool, now - 150, 10, 0, false).await.unwrap();
    assert_eq!(recent.len(), 2);
}
