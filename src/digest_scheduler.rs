use crate::clock::{Clock, next_run_utc};
use crate::digest_generator::{DigestError, DigestGenerator};
use crate::fetch_worker::truncate_error;
use crate::job_runs::JobRunLedger;
use crate::llm::LanguageModel;
use crate::notifier::Notifier;
use crate::settings::SettingsService;
use crate::shutdown::ShutdownFlag;
use crate::storage::Store;
use crate::types::JobStatus;
use anyhow::Result;
use chrono::{Duration as ChronoDuration, NaiveDateTime};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const JOB_NAME: &str = "digest_scheduler";

const FALLBACK_DIGEST_TIME: &str = "08:00";
const ERROR_MESSAGE_LIMIT: usize = 500;

/// One scheduled digest attempt. Skips when today's digest already exists,
/// maps a lost generation race to `skipped`, and records every outcome in
/// the ledger.
pub async fn run_once<S, M, N, C>(
    now: NaiveDateTime,
    store: &Arc<S>,
    generator: &DigestGenerator<S, M, N, C>,
    ledger: &JobRunLedger<S, C>,
    settings: &SettingsService<S, C>,
) -> Result<()>
where
    S: Store,
    M: LanguageModel,
    N: Notifier,
    C: Clock,
{
    let digest_date = now.date();
    let digest_time = settings.digest_time().await?;

    let run_id = ledger
        .start(
            JOB_NAME,
            Some(json!({
                "digest_date": digest_date.to_string(),
                "digest_time_utc": digest_time,
            })),
        )
        .await?;

    if store.digest_exists_for_date(digest_date).await? {
        info!(%digest_date, "digest already exists, skipping");
        ledger
            .finish(
                run_id,
                JobStatus::Skipped,
                Some(json!({
                    "digest_date": digest_date.to_string(),
                    "reason": "already_exists",
                })),
                None,
            )
            .await?;
        return Ok(());
    }

    match generator.generate().await {
        Ok(digest) => {
            let notified = digest.notified_at.is_some();
            info!(%digest_date, digest_id = %digest.id, notified, "digest generated");
            ledger
                .finish(
                    run_id,
                    JobStatus::Success,
                    Some(json!({
                        "digest_date": digest_date.to_string(),
                        "digest_id": digest.id.to_string(),
                        "notified": notified,
                        "digest_time_utc": digest_time,
                    })),
                    None,
                )
                .await?;
        }
        Err(DigestError::DateConflict(date)) => {
            // Another process created today's digest between our check and
            // our insert.
            info!(%date, "digest unique conflict, skipping");
            ledger
                .finish(
                    run_id,
                    JobStatus::Skipped,
                    Some(json!({
                        "digest_date": digest_date.to_string(),
                        "reason": "unique_conflict",
                    })),
                    None,
                )
                .await?;
        }
        Err(err) => {
            error!(error = %err, "digest generation failed");
            ledger
                .finish(
                    run_id,
                    JobStatus::Error,
                    Some(json!({
                        "digest_date": digest_date.to_string(),
                        "digest_time_utc": digest_time,
                    })),
                    Some(truncate_error(&err.to_string(), ERROR_MESSAGE_LIMIT)),
                )
                .await?;
        }
    }

    Ok(())
}

/// Long-running scheduler loop: sleep until the configured HH:MM UTC, run
/// one attempt, repeat.
pub async fn scheduler_loop<S, M, N, C>(
    store: Arc<S>,
    generator: &DigestGenerator<S, M, N, C>,
    ledger: &JobRunLedger<S, C>,
    settings: &SettingsService<S, C>,
    clock: &C,
    shutdown: &ShutdownFlag,
) where
    S: Store,
    M: LanguageModel,
    N: Notifier,
    C: Clock,
{
    while !shutdown.is_set() {
        let digest_time = match settings.digest_time().await {
            Ok(time) => time,
            Err(err) => {
                warn!(error = %err, "could not read digest_time setting, defaulting to 08:00");
                FALLBACK_DIGEST_TIME.to_string()
            }
        };

        let now = clock.now_utc();
        let next_run = next_run_utc(now, &digest_time)
            .or_else(|_| next_run_utc(now, FALLBACK_DIGEST_TIME))
            .unwrap_or(now + ChronoDuration::days(1));
        let sleep_seconds = (next_run - now).num_seconds().max(0) as u64;

        info!(
            next_run = %next_run.format("%Y-%m-%d %H:%M"),
            sleep_seconds,
            "next digest run scheduled"
        );
        shutdown.sleep(Duration::from_secs(sleep_seconds)).await;
        if shutdown.is_set() {
            break;
        }

        let now = clock.now_utc();
        if let Err(err) = run_once(now, &store, generator, ledger, settings).await {
            error!(error = %err, "unexpected error in digest scheduler");
        }
    }

    info!("digest scheduler stopped");
}
