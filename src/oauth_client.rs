// OAuth 2.0 refresh-token exchange against the provider token endpoint.
//
// Stateless: one network exchange per call, nothing mutated locally. The
// engine decides what to do with the outcome.
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshErrorKind {
    /// Transient: DNS, timeout, 5xx
    Network,
    /// The credential was revoked or expired; needs re-authorization
    InvalidGrant,
    /// Provider asked us to slow down
    RateLimited,
    /// Unclassified, treated as retryable
    Other,
}

impl RefreshErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::InvalidGrant => "invalid_grant",
            Self::RateLimited => "rate_limited",
            Self::Other => "other",
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidGrant)
    }
}

impl fmt::Display for RefreshErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct RefreshError {
    pub kind: RefreshErrorKind,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Present when the provider rotated the refresh token
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn refresh(
        &self,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<RefreshedToken, RefreshError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

pub struct MicrosoftTokenClient {
    http: Client,
    endpoint: String,
    scope: String,
}

impl MicrosoftTokenClient {
    pub fn new(endpoint: String, scope: String) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(EXCHANGE_TIMEOUT).build()?;
        Ok(Self {
            http,
            endpoint,
            scope,
        })
    }
}

#[async_trait]
impl TokenProvider for MicrosoftTokenClient {
    async fn refresh(
        &self,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<RefreshedToken, RefreshError> {
        let params = [
            ("client_id", client_id),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", self.scope.as_str()),
        ];

        let resp = self
            .http
            .post(&self.endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| RefreshError {
                kind: classify_transport(&e),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if status.is_success() {
            let body: TokenResponse = resp.json().await.map_err(|e| RefreshError {
                kind: RefreshErrorKind::Other,
                message: format!("token response parse: {e}"),
            })?;
            return Ok(RefreshedToken {
                access_token: body.access_token,
                refresh_token: body.refresh_token,
                expires_in: body.expires_in,
            });
        }

        let body = resp.text().await.unwrap_or_default();
        Err(classify_http(status, &body))
    }
}

fn classify_transport(e: &reqwest::Error) -> RefreshErrorKind {
    if e.is_timeout() || e.is_connect() {
        RefreshErrorKind::Network
    } else {
        RefreshErrorKind::Other
    }
}

fn classify_http(status: StatusCode, body: &str) -> RefreshError {
    let kind = if status == StatusCode::TOO_MANY_REQUESTS {
        RefreshErrorKind::RateLimited
    } else if status.is_server_error() {
        RefreshErrorKind::Network
    } else if body.contains("invalid_grant") {
        RefreshErrorKind::InvalidGrant
    } else {
        RefreshErrorKind::Other
    };

    // Prefer the provider's error code over the raw body
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| format!("token endpoint returned {status}"));

    RefreshError { kind, message }
}
