/// Refresh history models. Entries are append-only; the only thing that ever
/// deletes them is retention pruning.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptKind {
    Manual,
    Retry,
    Auto,
}

impl AttemptKind {
    pub fn from_str(s: &str) -> Self {
        match s {
            "retry" => Self::Retry,
            "auto" => Self::Auto,
            _ => Self::Manual,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Retry => "retry",
            Self::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RefreshLogEntry {
    pub id: i64,
    pub account_id: String,
    // Denormalized so history survives account deletion
    pub email: String,
    pub kind: String,
    pub outcome: String,
    pub error: Option<String>,
    pub created_at: i64,
}
