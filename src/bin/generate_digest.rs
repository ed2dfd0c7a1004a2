//! One-shot digest generation.
//!
//! Operational CLI for generating a digest outside the scheduler, e.g. after
//! seeding sources or to re-run a failed day. Exits non-zero when generation
//! fails, including when no unprocessed articles are available.

use anyhow::{Context, Result};
use secdigest::clock::SystemClock;
use secdigest::config::DatabaseConfig;
use secdigest::digest_generator::DigestGenerator;
use secdigest::llm::LlmRouter;
use secdigest::notifier::TelegramNotifier;
use secdigest::settings::SettingsService;
use secdigest::storage::PgStore;
use secdigest::summarizer::SummarizerService;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let db_config = DatabaseConfig::from_env()?;
    let store = Arc::new(
        PgStore::connect(&db_config)
            .await
            .context("cannot connect to database")?,
    );
    store.ping().await.context("database unreachable at startup")?;
    store.run_migrations().await?;

    let settings = SettingsService::new(Arc::clone(&store), SystemClock);
    let summarizer = SummarizerService::new(settings.clone(), LlmRouter::from_env());
    let generator = DigestGenerator::new(
        Arc::clone(&store),
        settings,
        summarizer,
        TelegramNotifier::from_env(),
        SystemClock,
    );

    let digest = generator
        .generate()
        .await
        .context("digest generation failed")?;

    println!("Digest generated successfully!");
    println!("  Date:     {}", digest.date);
    println!("  Status:   {}", digest.status);
    println!("  HTML:     {}", digest.html_path.as_deref().unwrap_or("-"));
    println!(
        "  Notified: {}",
        if digest.notified_at.is_some() { "yes" } else { "no" }
    );

    store.close().await;
    Ok(())
}
