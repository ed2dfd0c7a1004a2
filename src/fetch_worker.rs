use crate::article_extractor::ArticleExtractor;
use crate::clock::Clock;
use crate::config::WorkerConfig;
use crate::fetch_manager::{FetchManager, FetchStats};
use crate::job_runs::JobRunLedger;
use crate::shutdown::ShutdownFlag;
use crate::storage::Store;
use crate::types::JobStatus;
use anyhow::Result;
use rand::Rng;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};

pub const JOB_NAME: &str = "fetch_cycle";

const ERROR_MESSAGE_LIMIT: usize = 500;

/// Truncate an error message for the job-run ledger.
pub(crate) fn truncate_error(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        message.to_string()
    } else {
        message.chars().take(limit).collect()
    }
}

/// Run one fetch cycle and record it in the ledger. Returns the cycle stats
/// on success; any failure is recorded as an `error` run before propagating.
pub async fn run_cycle<S: Store, E: ArticleExtractor, C: Clock>(
    manager: &FetchManager<S, E, C>,
    ledger: &JobRunLedger<S, C>,
    max_sources: usize,
) -> Result<FetchStats> {
    let run_id = ledger.start(JOB_NAME, None).await?;

    match manager.fetch_due_sources(max_sources).await {
        Ok(stats) => {
            info!(
                sources_checked = stats.sources_checked,
                sources_fetched = stats.sources_fetched,
                articles_found = stats.articles_found,
                articles_new = stats.articles_new,
                articles_filtered = stats.articles_filtered,
                articles_old = stats.articles_old,
                errors = stats.errors.len(),
                "fetch cycle complete"
            );
            for message in &stats.errors {
                warn!(error = %message, "fetch error");
            }

            ledger
                .finish(
                    run_id,
                    JobStatus::Success,
                    Some(json!({
                        "sources_checked": stats.sources_checked,
                        "sources_fetched": stats.sources_fetched,
                        "articles_found": stats.articles_found,
                        "articles_new": stats.articles_new,
                        "articles_filtered": stats.articles_filtered,
                        "articles_old": stats.articles_old,
                        "errors": stats.errors.len(),
                    })),
                    None,
                )
                .await?;
            Ok(stats)
        }
        Err(err) => {
            ledger
                .finish(
                    run_id,
                    JobStatus::Error,
                    None,
                    Some(truncate_error(&err.to_string(), ERROR_MESSAGE_LIMIT)),
                )
                .await?;
            Err(err)
        }
    }
}

/// Long-running fetch-worker loop: one cycle per interval, with jitter to
/// keep multiple workers from stampeding, until shutdown is requested.
pub async fn run<S: Store, E: ArticleExtractor, C: Clock>(
    manager: &FetchManager<S, E, C>,
    ledger: &JobRunLedger<S, C>,
    config: &WorkerConfig,
    shutdown: &ShutdownFlag,
) {
    info!(
        interval_seconds = config.interval_seconds,
        jitter_seconds = config.jitter_seconds,
        max_sources = config.max_sources,
        "starting fetch worker"
    );

    while !shutdown.is_set() {
        if let Err(err) = run_cycle(manager, ledger, config.max_sources).await {
            error!(error = %err, "error in fetch cycle");
        }

        let jitter = rand::rng().random_range(0.0..=config.jitter_seconds as f64);
        let sleep = Duration::from_secs_f64(config.interval_seconds as f64 + jitter);
        info!(sleep_seconds = sleep.as_secs_f64(), "sleeping until next cycle");
        shutdown.sleep(sleep).await;
    }

    info!("fetch worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article_extractor::test_utils::FakeExtractor;
    use crate::clock::test_utils::FixedClock;
    use crate::storage::test_utils::InMemoryStore;
    use crate::types::{Category, Source, SourceType};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::sync::Arc;
    use uuid::Uuid;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 12)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn seeded_store() -> Arc<InMemoryStore> {
        let category = Category {
            id: Uuid::new_v4(),
            name: "Security".to_string(),
            digest_section: "security_news".to_string(),
            keywords: Vec::new(),
            created_at: now(),
        };
        let source = Source {
            id: Uuid::new_v4(),
            category_id: category.id,
            name: "feed".to_string(),
            url: "https://feed.example.com".to_string(),
            source_type: SourceType::Website,
            keywords: Vec::new(),
            enabled: true,
            fetch_interval_minutes: 60,
            last_fetched_at: None,
            created_at: now(),
        };
        Arc::new(
            InMemoryStore::new()
                .with_category(category)
                .with_source(source),
        )
    }

    #[tokio::test]
    async fn cycle_writes_start_and_success_rows() {
        let store = seeded_store();
        let clock = FixedClock(now());
        let manager = FetchManager::new(Arc::clone(&store), FakeExtractor::empty(), clock);
        let ledger = JobRunLedger::new(Arc::clone(&store), clock);

        let stats = run_cycle(&manager, &ledger, 10).await.unwrap();
        assert_eq!(stats.sources_fetched, 1);

        let runs = store.job_runs();
        assert_eq!(runs.len(), 1);
        let run = &runs[0];
        assert_eq!(run.job_name, JOB_NAME);
        assert_eq!(run.status, JobStatus::Success);
        assert!(run.finished_at.is_some());
        assert!(run.started_at <= run.finished_at.unwrap());
        assert_eq!(run.details["sources_fetched"], json!(1));
        assert_eq!(run.details["articles_new"], json!(0));
    }

    #[tokio::test]
    async fn per_source_errors_still_finish_as_success() {
        let store = seeded_store();
        let clock = FixedClock(now());
        let manager = FetchManager::new(
            Arc::clone(&store),
            FakeExtractor::failing("listing exploded"),
            clock,
        );
        let ledger = JobRunLedger::new(Arc::clone(&store), clock);

        let stats = run_cycle(&manager, &ledger, 10).await.unwrap();
        assert_eq!(stats.errors.len(), 1);

        let run = &store.job_runs()[0];
        assert_eq!(run.status, JobStatus::Success);
        assert_eq!(run.details["errors"], json!(1));
    }

    #[test]
    fn error_messages_are_truncated() {
        let long = "x".repeat(900);
        assert_eq!(truncate_error(&long, 500).chars().count(), 500);
        assert_eq!(truncate_error("short", 500), "short");
    }
}
