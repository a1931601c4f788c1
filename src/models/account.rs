/// Account model: one externally issued mail credential
use serde::{Deserialize, Serialize};

use crate::crypto::{CredentialCipher, CryptoError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    #[default]
    Unknown,
    Success,
    Failed,
}

impl RefreshStatus {
    pub fn from_str(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub client_id_enc: String,
    #[serde(skip_serializing)]
    pub refresh_token_enc: String,
    pub group_id: Option<i64>,
    pub remark: Option<String>,
    pub refresh_status: String,
    pub last_refresh_ts: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Account {
    /// Generate account ID from email
    pub fn generate_id(email: &str) -> String {
        format!("acc_{}", email.replace('@', "_").replace('.', "_"))
    }

    pub fn status(&self) -> RefreshStatus {
        RefreshStatus::from_str(&self.refresh_status)
    }

    /// Decrypt (client_id, refresh_token) for a provider exchange
    pub fn credentials(&self, cipher: &CredentialCipher) -> Result<(String, String), CryptoError> {
        let client_id = cipher.decrypt(&self.client_id_enc)?;
        let refresh_token = cipher.decrypt(&self.refresh_token_enc)?;
        Ok((client_id, refresh_token))
    }
}

/// One parsed line of the bulk import format:
/// `email----password----client_id----refresh_token`.
/// The password column is legacy baggage from exports and is not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedCredential {
    pub email: String,
    pub client_id: String,
    pub refresh_token: String,
}

pub fn parse_account_line(line: &str) -> Option<ImportedCredential> {
    let parts: Vec<&str> = line.trim().split("----").collect();
    if parts.len() < 4 {
        return None;
    }
    if parts[0].is_empty() || parts[2].is_empty() || parts[3].is_empty() {
        return None;
    }
    Some(ImportedCredential {
        email: parts[0].to_string(),
        client_id: parts[2].to_string(),
        refresh_token: parts[3].to_string(),
    })
}
