//! Digest-scheduler entrypoint.
//!
//! Long-running process that generates the daily digest at the configured
//! HH:MM UTC. The unique constraint on digest dates makes concurrent
//! instances safe; the extra ones record skipped runs.

use anyhow::{Context, Result};
use secdigest::clock::SystemClock;
use secdigest::config::DatabaseConfig;
use secdigest::digest_generator::DigestGenerator;
use secdigest::digest_scheduler;
use secdigest::job_runs::JobRunLedger;
use secdigest::llm::LlmRouter;
use secdigest::notifier::TelegramNotifier;
use secdigest::settings::SettingsService;
use secdigest::shutdown::ShutdownFlag;
use secdigest::storage::PgStore;
use secdigest::summarizer::SummarizerService;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("secdigest digest scheduler starting");

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

    let settings = SettingsService::new(Arc::clone(&store), SystemClock);
    let summarizer = SummarizerService::new(settings.clone(), LlmRouter::from_env());
    let generator = DigestGenerator::new(
        Arc::clone(&store),
        settings.clone(),
        summarizer,
        TelegramNotifier::from_env(),
        SystemClock,
    );
    let ledger = JobRunLedger::new(Arc::clone(&store), SystemClock);

    digest_scheduler::scheduler_loop(
        Arc::clone(&store),
        &generator,
        &ledger,
        &settings,
        &SystemClock,
        &shutdown,
    )
    .await;

    store.close().await;
    Ok(())
}
