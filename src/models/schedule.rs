use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    Interval,
    Cron,
}

impl ScheduleMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "interval" => Some(Self::Interval),
            "cron" => Some(Self::Cron),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interval => "interval",
            Self::Cron => "cron",
        }
    }
}

/// Singleton policy row (id = 1). Read by the scheduler loop on every tick,
/// written only through explicit configuration updates.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SchedulePolicy {
    pub enabled: bool,
    pub mode: String,
    pub interval_days: i64,
    pub cron_expr: Option<String>,
    pub anchored_at: Option<i64>,
    pub last_run_ts: Option<i64>,
    pub next_run_ts: Option<i64>,
    pub last_batch_finished_at: Option<i64>,
    pub updated_at: i64,
}
