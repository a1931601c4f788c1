use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use outlook_token_hub::crypto::CredentialCipher;
use outlook_token_hub::oauth_client::MicrosoftTokenClient;
use outlook_token_hub::services::refresh_engine::RefreshEngine;
use outlook_token_hub::{config, db, routes, services};

#[derive(Clone)]
struct AppState {
    pool: sqlx::SqlitePool,
    engine: Arc<RefreshEngine>,
    cipher: CredentialCipher,
}

impl axum::extract::FromRef<AppState> for sqlx::SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<RefreshEngine> {
    fn from_ref(state: &AppState) -> Self {
        state.engine.clone()
    }
}

impl axum::extract::FromRef<AppState> for CredentialCipher {
    fn from_ref(state: &AppState) -> Self {
        state.cipher.clone()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,outlook_token_hub=debug")),
        )
        .init();

    let cfg = config::Config::from_env()?;

    let db_url = normalize_sqlite_url(&cfg.database_url);
    // Ensure the file exists for file-based sqlite (avoid open error on some setups)
    if let Some(path) = db_file_path(&db_url) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        if !path.exists() {
            std::fs::File::create(&path).ok();
        }
    }

    let pool = db::connect(&db_url).await?;
    db::run_migrations(&pool).await?;

    // Key derivation happens once here; the same cipher serves the whole process
    let cipher = CredentialCipher::new(&cfg.master_secret);
    let provider = Arc::new(MicrosoftTokenClient::new(
        cfg.token_endpoint.clone(),
        cfg.token_scope.clone(),
    )?);
    let engine = Arc::new(RefreshEngine::new(
        pool.clone(),
        cipher.clone(),
        provider,
    ));

    services::scheduler::start(pool.clone(), engine.clone());

    let state = AppState {
        pool,
        engine,
        cipher,
    };

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .merge(routes::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let term = async {
        if let Ok(mut s) = signal::unix::signal(signal::unix::SignalKind::terminate()) {
            s.recv().await;
        }
    };
    #[cfg(not(unix))]
    let term = std::future::pending::<()>();
    tokio::select! { _ = ctrl_c => {}, _ = term => {} }
}

fn normalize_sqlite_url(input: &str) -> String {
    // Accept forms: sqlite:foo.db (fix), sqlite://foo.db (ok), file:foo.db (convert), just path (prepend)
    if input.starts_with("sqlite://") || input.starts_with("sqlite::memory:") {
        return input.to_string();
    }
    if input.starts_with("sqlite:") {
        let rest = input.trim_start_matches("sqlite:");
        return format!("sqlite://{}", rest.trim_start_matches('/'));
    }
    if input.starts_with("file:") {
        return format!("sqlite://{}", input.trim_start_matches("file:"));
    }
    format!("sqlite://{}", input)
}

fn db_file_path(url: &str) -> Option<std::path::PathBuf> {
    if let Some(rest) = url.strip_prefix("sqlite://") {
        if rest == ":memory:" {
            return None;
        }
        return Some(std::path::PathBuf::from(rest));
    }
    None
}
