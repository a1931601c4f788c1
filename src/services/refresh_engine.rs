/// Refresh engine: exercises every targeted credential against the provider,
/// one account at a time, under a process-wide exclusive run lock.
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};

use crate::crypto::CredentialCipher;
use crate::db;
use crate::models::account::{Account, RefreshStatus};
use crate::models::refresh_log::{AttemptKind, Outcome};
use crate::oauth_client::{RefreshErrorKind, RefreshedToken, TokenProvider};
use crate::services::{account_service, history_service, schedule_service};

const PROGRESS_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a refresh run is already in progress")]
    Busy,
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// One record on the progress channel. The serialized field names are the
/// wire contract consumed over SSE.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    Step {
        processed: u32,
        total: u32,
        current_email: String,
        status: Outcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Summary {
        done: bool,
        processed: u32,
        total: u32,
        success_count: u32,
        failure_count: u32,
        started_at: i64,
        finished_at: i64,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: i64,
    pub processed: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub started_at: i64,
    pub finished_at: i64,
}

/// Live state of the in-flight run. Ephemeral: discarded at completion,
/// never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub run_id: i64,
    pub total: u32,
    pub processed: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub current_email: Option<String>,
    pub started_at: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOutcome {
    pub account_id: String,
    pub email: String,
    pub status: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedRun {
    pub run_id: i64,
    pub total: u32,
}

pub struct RefreshEngine {
    pool: SqlitePool,
    cipher: CredentialCipher,
    provider: Arc<dyn TokenProvider>,
    run_lock: Arc<Mutex<()>>,
    current: RwLock<Option<RunState>>,
    progress_tx: broadcast::Sender<ProgressEvent>,
}

impl RefreshEngine {
    pub fn new(pool: SqlitePool, cipher: CredentialCipher, provider: Arc<dyn TokenProvider>) -> Self {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            pool,
            cipher,
            provider,
            run_lock: Arc::new(Mutex::new(())),
            current: RwLock::new(None),
            progress_tx,
        }
    }

    /// Attach a progress consumer. Idempotent; a consumer attaching mid-run
    /// sees only events from this point forward.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress_tx.subscribe()
    }

    pub async fn current_run(&self) -> Option<RunState> {
        self.current.read().await.clone()
    }

    /// Run a batch to completion on the caller's task. Fails fast with Busy
    /// while another run holds the lock.
    pub async fn run_batch(&self, kind: AttemptKind) -> Result<RunSummary, EngineError> {
        let _guard = self.run_lock.try_lock().map_err(|_| EngineError::Busy)?;
        let accounts = self.snapshot(kind).await?;
        let (summary, _) = self.execute_run(accounts, kind, new_run_id()).await;
        Ok(summary)
    }

    /// Start a batch in the background, returning as soon as the target list
    /// is snapshotted. The lock is held by the spawned task until the run
    /// drains its entire snapshot.
    pub async fn start_batch(self: &Arc<Self>, kind: AttemptKind) -> Result<StartedRun, EngineError> {
        let guard = self
            .run_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| EngineError::Busy)?;
        let accounts = self.snapshot(kind).await?;
        let run_id = new_run_id();
        let total = accounts.len() as u32;

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            engine.execute_run(accounts, kind, run_id).await;
        });

        Ok(StartedRun { run_id, total })
    }

    /// Refresh a single account synchronously. Takes the same run lock as a
    /// batch, so the at-most-one-run guarantee covers it too.
    pub async fn refresh_one(
        &self,
        account_id: &str,
        kind: AttemptKind,
    ) -> Result<AccountOutcome, EngineError> {
        let _guard = self.run_lock.try_lock().map_err(|_| EngineError::Busy)?;
        let account = account_service::get_account(&self.pool, account_id)
            .await?
            .ok_or_else(|| EngineError::AccountNotFound(account_id.to_string()))?;
        let (_, mut outcomes) = self.execute_run(vec![account], kind, new_run_id()).await;
        // execute_run on a one-element snapshot always yields one outcome
        outcomes
            .pop()
            .ok_or_else(|| EngineError::Internal(anyhow::anyhow!("empty run result")))
    }

    /// Snapshot the target list: retry runs cover only the currently failing
    /// accounts, everything else covers the whole fleet.
    async fn snapshot(&self, kind: AttemptKind) -> Result<Vec<Account>, EngineError> {
        let accounts = match kind {
            AttemptKind::Retry => {
                let failing = history_service::list_failed_current(&self.pool).await?;
                let ids: Vec<String> = failing.into_iter().map(|e| e.account_id).collect();
                account_service::get_many(&self.pool, &ids).await?
            }
            AttemptKind::Manual | AttemptKind::Auto => {
                account_service::list_active(&self.pool).await?
            }
        };
        Ok(accounts)
    }

    /// Drains the snapshot in ascending-id order. Individual failures never
    /// abort the run; after the last account a single terminal summary event
    /// is emitted and retention pruning kicks in.
    async fn execute_run(
        &self,
        accounts: Vec<Account>,
        kind: AttemptKind,
        run_id: i64,
    ) -> (RunSummary, Vec<AccountOutcome>) {
        let started_at = db::now_epoch();
        let total = accounts.len() as u32;
        info!(run_id, total, kind = kind.as_str(), "refresh run started");

        {
            let mut current = self.current.write().await;
            *current = Some(RunState {
                run_id,
                total,
                processed: 0,
                success_count: 0,
                failure_count: 0,
                current_email: None,
                started_at,
            });
        }

        let mut processed = 0u32;
        let mut success_count = 0u32;
        let mut failure_count = 0u32;
        let mut outcomes = Vec::with_capacity(accounts.len());

        for account in &accounts {
            {
                let mut current = self.current.write().await;
                if let Some(state) = current.as_mut() {
                    state.current_email = Some(account.email.clone());
                }
            }

            let (status, error) = self.process_account(account, kind).await;
            processed += 1;
            match status {
                Outcome::Success => success_count += 1,
                Outcome::Failed => failure_count += 1,
            }

            {
                let mut current = self.current.write().await;
                if let Some(state) = current.as_mut() {
                    state.processed = processed;
                    state.success_count = success_count;
                    state.failure_count = failure_count;
                }
            }

            // Best effort: with no consumer attached the event is dropped
            let _ = self.progress_tx.send(ProgressEvent::Step {
                processed,
                total,
                current_email: account.email.clone(),
                status,
                error: error.clone(),
            });

            outcomes.push(AccountOutcome {
                account_id: account.id.clone(),
                email: account.email.clone(),
                status,
                error,
            });
        }

        let finished_at = db::now_epoch();

        if let Err(e) = schedule_service::record_batch_finished(&self.pool, finished_at).await {
            warn!(error = %e, "failed to record batch completion time");
        }
        match history_service::prune(
            &self.pool,
            history_service::RETENTION_DAYS,
            history_service::RETENTION_MAX_ENTRIES,
        )
        .await
        {
            Ok(0) => {}
            Ok(n) => info!(removed = n, "pruned refresh history"),
            Err(e) => warn!(error = %e, "history pruning failed"),
        }

        let _ = self.progress_tx.send(ProgressEvent::Summary {
            done: true,
            processed,
            total,
            success_count,
            failure_count,
            started_at,
            finished_at,
        });

        {
            let mut current = self.current.write().await;
            *current = None;
        }

        info!(
            run_id,
            processed, success_count, failure_count, "refresh run finished"
        );

        (
            RunSummary {
                run_id,
                processed,
                success_count,
                failure_count,
                started_at,
                finished_at,
            },
            outcomes,
        )
    }

    /// One account step: exchange, persist rotation, write status through the
    /// store, append to the ledger. Store or ledger errors are logged and do
    /// not stop the run.
    async fn process_account(
        &self,
        account: &Account,
        kind: AttemptKind,
    ) -> (Outcome, Option<String>) {
        let (outcome, error) = match self.exchange(account).await {
            Ok(token) => {
                self.persist_rotation(account, &token).await;
                (Outcome::Success, None)
            }
            Err(message) => (Outcome::Failed, Some(message)),
        };

        let status = match outcome {
            Outcome::Success => RefreshStatus::Success,
            Outcome::Failed => RefreshStatus::Failed,
        };
        let ts = db::now_epoch();
        match account_service::update_refresh_state(&self.pool, &account.id, status, ts).await {
            Ok(true) => {}
            Ok(false) => warn!(email = %account.email, "account vanished mid-run, status not stored"),
            Err(e) => warn!(email = %account.email, error = %e, "failed to store refresh status"),
        }
        if let Err(e) = history_service::append(
            &self.pool,
            &account.id,
            &account.email,
            kind,
            outcome,
            error.as_deref(),
        )
        .await
        {
            warn!(email = %account.email, error = %e, "failed to append history entry");
        }

        (outcome, error)
    }

    async fn exchange(&self, account: &Account) -> Result<RefreshedToken, String> {
        let (client_id, refresh_token) = account
            .credentials(&self.cipher)
            .map_err(|e| format!("credential decrypt: {e}"))?;

        self.provider
            .refresh(&client_id, &refresh_token)
            .await
            .map_err(|e| match e.kind {
                RefreshErrorKind::InvalidGrant => {
                    format!("re-authorization required: {}", e.message)
                }
                _ => e.to_string(),
            })
    }

    /// The provider may rotate the refresh token on a successful exchange;
    /// storing the new one is what keeps the credential alive.
    async fn persist_rotation(&self, account: &Account, token: &RefreshedToken) {
        let Some(rotated) = token.refresh_token.as_deref() else {
            return;
        };
        match self.cipher.encrypt(rotated) {
            Ok(enc) => {
                if let Err(e) =
                    account_service::update_refresh_secret(&self.pool, &account.id, &enc).await
                {
                    warn!(email = %account.email, error = %e, "failed to persist rotated refresh token");
                }
            }
            Err(e) => {
                warn!(email = %account.email, error = %e, "failed to encrypt rotated refresh token")
            }
        }
    }
}

fn new_run_id() -> i64 {
    Utc::now().timestamp_millis()
}
