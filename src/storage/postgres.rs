use super::{ArticleInsert, DigestInsert, Store};
use crate::config::DatabaseConfig;
use crate::types::{Article, Category, ClaimedSource, Digest, JobRun, JobStatus, NewArticle, Source};
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

// ============================================================================
// PgStore — PostgreSQL-backed Store implementation
// ============================================================================

/// PostgreSQL store. Constructed once per process in `main` and shared via
/// `Arc`; the pool handles per-call connection checkout.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .context("failed to connect to PostgreSQL")?;
        info!(max_connections = config.max_connections, "connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Startup liveness probe. Binaries treat a failure here as fatal.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("database ping failed")?;
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run database migrations")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("disconnected from PostgreSQL");
    }

    async fn category_by_id(
        tx: &mut Transaction<'static, Postgres>,
        category_id: Uuid,
    ) -> Result<Category> {
        let category = sqlx::query_as::<_, Category>(
            "SELECT id, name, digest_section, keywords, created_at \
             FROM categories WHERE id = $1",
        )
        .bind(category_id)
        .fetch_one(&mut **tx)
        .await
        .with_context(|| format!("category not found: {}", category_id))?;
        Ok(category)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

const SOURCE_COLUMNS: &str = "id, category_id, name, url, source_type, keywords, enabled, \
     fetch_interval_minutes, last_fetched_at, created_at";

impl Store for PgStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<()> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<()> {
        tx.rollback().await?;
        Ok(())
    }

    async fn claim_next_due_source(
        &self,
        tx: &mut Self::Tx,
        now: NaiveDateTime,
        exclude: &[Uuid],
    ) -> Result<Option<ClaimedSource>> {
        // The due predicate and the lock live in the same statement so the
        // check-and-claim is atomic. SKIP LOCKED keeps concurrent workers off
        // each other's rows; the lock is held until the surrounding
        // transaction ends.
        let source = sqlx::query_as::<_, Source>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources \
             WHERE enabled = TRUE \
               AND (last_fetched_at IS NULL \
                    OR last_fetched_at <= $1 - fetch_interval_minutes * INTERVAL '1 minute') \
               AND id <> ALL($2) \
             ORDER BY last_fetched_at ASC NULLS FIRST \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED"
        ))
        .bind(now)
        .bind(exclude)
        .fetch_optional(&mut **tx)
        .await
        .context("failed to claim a due source")?;

        let Some(source) = source else {
            return Ok(None);
        };
        let category = Self::category_by_id(tx, source.category_id).await?;
        Ok(Some(ClaimedSource { source, category }))
    }

    async fn get_source_for_update(
        &self,
        tx: &mut Self::Tx,
        source_id: Uuid,
    ) -> Result<Option<ClaimedSource>> {
        let source = sqlx::query_as::<_, Source>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE id = $1 FOR UPDATE"
        ))
        .bind(source_id)
        .fetch_optional(&mut **tx)
        .await
        .context("failed to lock source")?;

        let Some(source) = source else {
            return Ok(None);
        };
        let category = Self::category_by_id(tx, source.category_id).await?;
        Ok(Some(ClaimedSource { source, category }))
    }

    async fn update_last_fetched(
        &self,
        tx: &mut Self::Tx,
        source_id: Uuid,
        ts: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query("UPDATE sources SET last_fetched_at = $1 WHERE id = $2")
            .bind(ts)
            .bind(source_id)
            .execute(&mut **tx)
            .await
            .context("failed to update last_fetched_at")?;
        Ok(())
    }

    async fn article_url_exists(&self, tx: &mut Self::Tx, url: &str) -> Result<bool> {
        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM articles WHERE url = $1")
            .bind(url)
            .fetch_optional(&mut **tx)
            .await
            .context("failed to check article url")?;
        Ok(exists.is_some())
    }

    async fn insert_article(
        &self,
        tx: &mut Self::Tx,
        article: &NewArticle,
    ) -> Result<ArticleInsert> {
        // ON CONFLICT DO NOTHING keeps a racing duplicate from aborting the
        // whole transaction; losing the race is an expected no-op.
        let result = sqlx::query(
            "INSERT INTO articles \
                 (id, source_id, url, title, raw_content, digest_section, published_at, fetched_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (url) DO NOTHING",
        )
        .bind(article.id)
        .bind(article.source_id)
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.raw_content)
        .bind(&article.digest_section)
        .bind(article.published_at)
        .bind(article.fetched_at)
        .execute(&mut **tx)
        .await
        .context("failed to insert article")?;

        if result.rows_affected() == 0 {
            Ok(ArticleInsert::DuplicateUrl)
        } else {
            Ok(ArticleInsert::Inserted)
        }
    }

    async fn unprocessed_articles(&self) -> Result<Vec<Article>> {
        let articles = sqlx::query_as::<_, Article>(
            "SELECT id, source_id, url, title, raw_content, summary, digest_section, \
                    relevance_score, published_at, fetched_at, digest_id \
             FROM articles WHERE digest_id IS NULL \
             ORDER BY fetched_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to load unprocessed articles")?;
        Ok(articles)
    }

    async fn digest_exists_for_date(&self, date: NaiveDate) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM digests WHERE date = $1")
            .bind(date)
            .fetch_one(&self.pool)
            .await
            .context("failed to check for existing digest")?;
        Ok(count > 0)
    }

    async fn create_digest(
        &self,
        digest: &Digest,
        articles: &[(Uuid, Option<String>)],
    ) -> Result<DigestInsert> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO digests (id, date, status, html_path, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(digest.id)
        .bind(digest.date)
        .bind(digest.status)
        .bind(&digest.html_path)
        .bind(digest.created_at)
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            if is_unique_violation(&err) {
                tx.rollback().await.ok();
                return Ok(DigestInsert::DateConflict);
            }
            return Err(err).context("failed to insert digest");
        }

        for (article_id, summary) in articles {
            sqlx::query("UPDATE articles SET digest_id = $1, summary = $2 WHERE id = $3")
                .bind(digest.id)
                .bind(summary)
                .bind(article_id)
                .execute(&mut *tx)
                .await
                .context("failed to attach article to digest")?;
        }

        tx.commit().await?;
        Ok(DigestInsert::Created)
    }

    async fn set_digest_notified(&self, digest_id: Uuid, ts: NaiveDateTime) -> Result<()> {
        sqlx::query("UPDATE digests SET notified_at = $1 WHERE id = $2")
            .bind(ts)
            .bind(digest_id)
            .execute(&self.pool)
            .await
            .context("failed to mark digest notified")?;
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<Value>> {
        let value: Option<Value> = sqlx::query_scalar("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("failed to read setting")?;
        Ok(value)
    }

    async fn upsert_setting(
        &self,
        key: &str,
        value: &Value,
        updated_at: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES ($1, $2, $3) \
             ON CONFLICT (key) DO UPDATE \
                 SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .context("failed to upsert setting")?;
        Ok(())
    }

    async fn delete_setting(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .context("failed to delete setting")?;
        Ok(())
    }

    async fn all_settings(&self) -> Result<HashMap<String, Value>> {
        let rows: Vec<(String, Value)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await
            .context("failed to load settings")?;
        Ok(rows.into_iter().collect())
    }

    async fn insert_job_run(&self, run: &JobRun) -> Result<()> {
        sqlx::query(
            "INSERT INTO job_runs (id, job_name, status, started_at, details) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(run.id)
        .bind(&run.job_name)
        .bind(run.status.as_str())
        .bind(run.started_at)
        .bind(&run.details)
        .execute(&self.pool)
        .await
        .context("failed to insert job run")?;
        Ok(())
    }

    async fn finish_job_run(
        &self,
        run_id: Uuid,
        status: JobStatus,
        finished_at: NaiveDateTime,
        details: Option<Value>,
        error_message: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE job_runs \
             SET status = $2, finished_at = $3, \
                 details = COALESCE($4, details), \
                 error_message = COALESCE($5, error_message) \
             WHERE id = $1",
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind(finished_at)
        .bind(details)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .context("failed to finish job run")?;
        Ok(())
    }

    async fn latest_job_run(&self, job_name: &str) -> Result<Option<JobRun>> {
        let run = sqlx::query_as::<_, JobRun>(
            "SELECT id, job_name, status, started_at, finished_at, details, error_message \
             FROM job_runs WHERE job_name = $1 \
             ORDER BY started_at DESC LIMIT 1",
        )
        .bind(job_name)
        .fetch_optional(&self.pool)
        .await
        .context("failed to load latest job run")?;
        Ok(run)
    }
}
