mod common;

use chrono::{TimeZone, Timelike, Utc};
use common::test_pool;
use outlook_token_hub::models::schedule::ScheduleMode;
use outlook_token_hub::services::schedule_service::{self, PolicyUpdate, ScheduleError};

#[tokio::test]
async fn defaults_to_disabled_interval_policy() {
    let pool = test_pool().await;
    let policy = schedule_service::load(&pool).await.unwrap();
    assert!(!policy.enabled);
    assert_eq!(policy.mode, "interval");
    assert_eq!(policy.interval_days, 30);
    assert!(policy.next_run_ts.is_none());
}

#[tokio::test]
async fn invalid_cron_is_rejected_without_persisting() {
    let pool = test_pool().await;

    let err = schedule_service::save(
        &pool,
        PolicyUpdate {
            enabled: true,
            mode: ScheduleMode::Cron,
            interval_days: None,
            cron_expr: Some("not-a-cron".into()),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ScheduleError::InvalidCron(_)));
    assert!(err.is_config());

    // the stored policy is untouched
    let policy = schedule_service::load(&pool).await.unwrap();
    assert!(!policy.enabled);
    assert_eq!(policy.mode, "interval");
    assert!(policy.cron_expr.is_none());
}

#[tokio::test]
async fn cron_mode_requires_an_expression() {
    let pool = test_pool().await;
    let err = schedule_service::save(
        &pool,
        PolicyUpdate {
            enabled: true,
            mode: ScheduleMode::Cron,
            interval_days: None,
            cron_expr: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ScheduleError::MissingCron));
}

#[tokio::test]
async fn interval_days_bounds_are_enforced() {
    let pool = test_pool().await;
    for days in [0, 91, -5] {
        let err = schedule_service::save(
            &pool,
            PolicyUpdate {
                enabled: true,
                mode: ScheduleMode::Interval,
                interval_days: Some(days),
                cron_expr: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ScheduleError::IntervalOutOfRange(_)));
    }
}

#[tokio::test]
async fn interval_anchors_at_activation_then_last_run() {
    let pool = test_pool().await;
    let policy = schedule_service::save(
        &pool,
        PolicyUpdate {
            enabled: true,
            mode: ScheduleMode::Interval,
            interval_days: Some(7),
            cron_expr: None,
        },
    )
    .await
    .unwrap();

    let anchored_at = policy.anchored_at.unwrap();
    let now = Utc::now();
    let next = schedule_service::next_run(&policy, now).unwrap().unwrap();
    assert_eq!(next, anchored_at + 7 * 86_400);

    // once a scheduled run completed, it becomes the anchor
    let run_ts = anchored_at + 7 * 86_400 + 42;
    schedule_service::record_scheduled_run(&pool, run_ts).await.unwrap();
    let policy = schedule_service::load(&pool).await.unwrap();
    let next = schedule_service::next_run(&policy, now).unwrap().unwrap();
    assert_eq!(next, run_ts + 7 * 86_400);
}

#[tokio::test]
async fn cron_mode_fires_strictly_after_now() {
    let pool = test_pool().await;
    let policy = schedule_service::save(
        &pool,
        PolicyUpdate {
            enabled: true,
            mode: ScheduleMode::Cron,
            interval_days: None,
            cron_expr: Some("0 3 * * *".into()),
        },
    )
    .await
    .unwrap();

    let now = Utc.with_ymd_and_hms(2026, 8, 7, 3, 0, 0).unwrap();
    let next = schedule_service::next_run(&policy, now).unwrap().unwrap();
    assert!(next > now.timestamp());
    let next_dt = Utc.timestamp_opt(next, 0).unwrap();
    assert_eq!(next_dt.hour(), 3);
    assert_eq!(next_dt.minute(), 0);
    // 03:00 exactly "now" means the next firing is tomorrow
    assert_eq!(next - now.timestamp(), 86_400);
}

#[tokio::test]
async fn disabled_policy_never_fires() {
    let pool = test_pool().await;
    let policy = schedule_service::load(&pool).await.unwrap();
    assert!(schedule_service::next_run(&policy, Utc::now()).unwrap().is_none());
}

#[tokio::test]
async fn skipped_firing_recomputes_from_current_time() {
    let pool = test_pool().await;
    let policy = schedule_service::save(
        &pool,
        PolicyUpdate {
            enabled: true,
            mode: ScheduleMode::Interval,
            interval_days: Some(3),
            cron_expr: None,
        },
    )
    .await
    .unwrap();

    let from = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap();
    let next = schedule_service::next_run_from(&policy, from).unwrap().unwrap();
    assert_eq!(next, from.timestamp() + 3 * 86_400);
}

#[tokio::test]
async fn preview_reports_validity_and_firing_times() {
    let times =
        schedule_service::preview_cron("0 2 * * *", Utc.with_ymd_and_hms(2026, 8, 7, 13, 0, 0).unwrap(), 5)
            .unwrap();
    assert_eq!(times.len(), 5);
    let first = Utc.timestamp_opt(times[0], 0).unwrap();
    assert_eq!(
        first,
        Utc.with_ymd_and_hms(2026, 8, 8, 2, 0, 0).unwrap()
    );

    assert!(schedule_service::preview_cron("not-a-cron", Utc::now(), 5).is_err());
}
