//! Fetch-worker entrypoint.
//!
//! Long-running process that claims due sources and ingests their articles.
//! Several instances may run against the same database; row locks keep them
//! off each other's sources.

use anyhow::{Context, Result};
use secdigest::article_extractor::WebsiteExtractor;
use secdigest::clock::SystemClock;
use secdigest::config::{DatabaseConfig, WorkerConfig};
use secdigest::fetch_manager::FetchManager;
use secdigest::fetch_worker;
use secdigest::job_runs::JobRunLedger;
use secdigest::shutdown::ShutdownFlag;
use secdigest::storage::PgStore;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    info!("secdigest fetch worker starting");

    let db_config = DatabaseConfig::from_env()?;
    let store = Arc::new(
        PgStore::connect(&db_config)
            .await
            .context("cannot connect to database")?,
    );
    store.ping().await.context("database unreachable at startup")?;
    store.run_migrations().await?;

    let shutdown = ShutdownFlag::new();
    shutdown.install_signal_handlers()?;

    let extractor = WebsiteExtractor::new()?;
    let manager = FetchManager::new(Arc::clone(&store), extractor, SystemClock);
    let ledger = JobRunLedger::new(Arc::clone(&store), SystemClock);

    fetch_worker::run(&manager, &ledger, &config, &shutdown).await;

    store.close().await;
    Ok(())
}
