use crate::clock::Clock;
use crate::storage::Store;
use crate::types::{JobRun, JobStatus};
use anyhow::Result;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Append-only ledger of background job executions. Every attempt gets a
/// `running` row at start and exactly one terminal update at finish.
pub struct JobRunLedger<S, C> {
    store: Arc<S>,
    clock: C,
}

impl<S: Store, C: Clock> JobRunLedger<S, C> {
    pub fn new(store: Arc<S>, clock: C) -> Self {
        Self { store, clock }
    }

    /// Record the start of a run and return its id.
    pub async fn start(&self, job_name: &str, details: Option<Value>) -> Result<Uuid> {
        let run = JobRun {
            id: Uuid::new_v4(),
            job_name: job_name.to_string(),
            status: JobStatus::Running,
            started_at: self.clock.now_utc(),
            finished_at: None,
            details: details.unwrap_or_else(|| json!({})),
            error_message: None,
        };
        self.store.insert_job_run(&run).await?;
        info!(job_name, run_id = %run.id, "job run started");
        Ok(run.id)
    }

    /// Record the terminal outcome of a run. `details` replaces the stored
    /// details only when provided.
    pub async fn finish(
        &self,
        run_id: Uuid,
        status: JobStatus,
        details: Option<Value>,
        error_message: Option<String>,
    ) -> Result<()> {
        self.store
            .finish_job_run(run_id, status, self.clock.now_utc(), details, error_message)
            .await?;
        info!(run_id = %run_id, status = %status, "job run finished");
        Ok(())
    }

    /// The run with the greatest `started_at` for a job, if any.
    pub async fn get_latest(&self, job_name: &str) -> Result<Option<JobRun>> {
        self.store.latest_job_run(job_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_utils::FixedClock;
    use crate::storage::test_utils::InMemoryStore;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 12)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn start_records_running_row() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = JobRunLedger::new(Arc::clone(&store), FixedClock(at(8, 0)));

        let run_id = ledger
            .start("fetch_cycle", Some(json!({"max_sources": 10})))
            .await
            .unwrap();

        let runs = store.job_runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, run_id);
        assert_eq!(runs[0].status, JobStatus::Running);
        assert_eq!(runs[0].started_at, at(8, 0));
        assert!(runs[0].finished_at.is_none());
        assert_eq!(runs[0].details, json!({"max_sources": 10}));
    }

    #[tokio::test]
    async fn finish_sets_terminal_fields_once() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = JobRunLedger::new(Arc::clone(&store), FixedClock(at(8, 5)));

        let run_id = ledger.start("fetch_cycle", None).await.unwrap();
        ledger
            .finish(
                run_id,
                JobStatus::Error,
                None,
                Some("boom".to_string()),
            )
            .await
            .unwrap();

        let run = &store.job_runs()[0];
        assert_eq!(run.status, JobStatus::Error);
        assert_eq!(run.finished_at, Some(at(8, 5)));
        assert_eq!(run.error_message.as_deref(), Some("boom"));
        assert!(run.started_at <= run.finished_at.unwrap());
    }

    #[tokio::test]
    async fn get_latest_returns_most_recent_start() {
        let store = Arc::new(InMemoryStore::new());

        let early = JobRunLedger::new(Arc::clone(&store), FixedClock(at(6, 0)));
        let late = JobRunLedger::new(Arc::clone(&store), FixedClock(at(9, 0)));

        early.start("digest_scheduler", None).await.unwrap();
        let late_id = late.start("digest_scheduler", None).await.unwrap();
        early.start("fetch_cycle", None).await.unwrap();

        let latest = store
            .latest_job_run("digest_scheduler")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, late_id);

        let ledger = JobRunLedger::new(Arc::clone(&store), FixedClock(at(9, 0)));
        assert!(ledger.get_latest("missing_job").await.unwrap().is_none());
    }
}
