mod config;
mod db;
mod web;

use anyhow::Result;
use std::env;
use tracing_subscriber::EnvFilter;

use db::Db;
use web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("INGEST_CONFIG").unwrap_or_else(|_| "ingest.toml".to_string());
    let cfg = config::resolve(&config_path, |key| env::var(key).ok())?;

    // ── Document store ──────────────────────────────────────────────
    // One attempt at startup. On failure the service keeps running and
    // answers every data request with 500 until restarted.
    let store = match Db::open(&cfg.db_url, cfg.connect_timeout()).await {
        Ok(db) => {
            tracing::info!(db_url = %cfg.db_url, "document store connected");
            Some(db)
        }
        Err(e) => {
            tracing::error!(db_url = %cfg.db_url, "document store unavailable: {e:#}");
            None
        }
    };

    // ── Web server ──────────────────────────────────────────────────
    web::serve(&cfg, AppState::new(store)).await
}
