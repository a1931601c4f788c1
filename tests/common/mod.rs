#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use outlook_token_hub::crypto::CredentialCipher;
use outlook_token_hub::db;
use outlook_token_hub::models::account::Account;
use outlook_token_hub::oauth_client::{
    RefreshError, RefreshErrorKind, RefreshedToken, TokenProvider,
};
use outlook_token_hub::services::account_service;
use outlook_token_hub::services::refresh_engine::RefreshEngine;

/// Single-connection pool so every query sees the same in-memory database.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

pub fn test_cipher() -> CredentialCipher {
    CredentialCipher::new("test-master-secret")
}

pub async fn seed_account(
    pool: &SqlitePool,
    cipher: &CredentialCipher,
    email: &str,
    refresh_token: &str,
) -> Account {
    account_service::add_account(
        pool,
        cipher,
        email,
        &format!("client-{email}"),
        refresh_token,
        None,
        None,
    )
    .await
    .unwrap()
}

pub fn engine(
    pool: &SqlitePool,
    cipher: &CredentialCipher,
    provider: Arc<dyn TokenProvider>,
) -> Arc<RefreshEngine> {
    Arc::new(RefreshEngine::new(pool.clone(), cipher.clone(), provider))
}

#[derive(Debug, Clone)]
pub enum Script {
    Succeed,
    SucceedRotating(String),
    Fail(RefreshErrorKind, String),
}

/// Provider double scripted per refresh token. Unscripted tokens succeed.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn set(&self, refresh_token: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(refresh_token.to_string(), script);
    }

    /// Refresh tokens seen, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenProvider for ScriptedProvider {
    async fn refresh(
        &self,
        _client_id: &str,
        refresh_token: &str,
    ) -> Result<RefreshedToken, RefreshError> {
        self.calls.lock().unwrap().push(refresh_token.to_string());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(refresh_token)
            .cloned()
            .unwrap_or(Script::Succeed);
        match script {
            Script::Succeed => Ok(RefreshedToken {
                access_token: "at".into(),
                refresh_token: None,
                expires_in: Some(3600),
            }),
            Script::SucceedRotating(next) => Ok(RefreshedToken {
                access_token: "at".into(),
                refresh_token: Some(next),
                expires_in: Some(3600),
            }),
            Script::Fail(kind, message) => Err(RefreshError { kind, message }),
        }
    }
}

/// Provider that holds every exchange open for a while; used to observe the
/// run lock from another task.
pub struct DelayProvider {
    pub delay: Duration,
}

#[async_trait]
impl TokenProvider for DelayProvider {
    async fn refresh(
        &self,
        _client_id: &str,
        _refresh_token: &str,
    ) -> Result<RefreshedToken, RefreshError> {
        tokio::time::sleep(self.delay).await;
        Ok(RefreshedToken {
            access_token: "at".into(),
            refresh_token: None,
            expires_in: Some(3600),
        })
    }
}
