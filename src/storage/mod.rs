use crate::types::{Article, ClaimedSource, Digest, JobRun, JobStatus, NewArticle};
use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

pub mod postgres;
pub use postgres::PgStore;

/// Outcome of inserting an article. A duplicate URL is an expected signal of
/// de-duplication, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleInsert {
    Inserted,
    DuplicateUrl,
}

/// Outcome of creating a digest. A date conflict means another process won
/// the race for today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestInsert {
    Created,
    DateConflict,
}

// ============================================================================
// Store trait
// ============================================================================

/// Persistence seam for the whole core. The associated `Tx` type lets the
/// fetch path hold a claimed source's row lock across the entire per-source
/// unit of work: the lock is taken by `claim_next_due_source` and released by
/// `commit` or `rollback`.
#[allow(async_fn_in_trait)]
pub trait Store: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx>;
    async fn commit(&self, tx: Self::Tx) -> Result<()>;
    async fn rollback(&self, tx: Self::Tx) -> Result<()>;

    /// Claim the next due source, skipping rows locked by other transactions
    /// and the given already-attempted ids. Due means enabled and either
    /// never fetched or past its per-source cadence. Never-fetched sources
    /// come first, then oldest `last_fetched_at`.
    async fn claim_next_due_source(
        &self,
        tx: &mut Self::Tx,
        now: NaiveDateTime,
        exclude: &[Uuid],
    ) -> Result<Option<ClaimedSource>>;

    /// Lock a specific source regardless of its due state (force-fetch path).
    async fn get_source_for_update(
        &self,
        tx: &mut Self::Tx,
        source_id: Uuid,
    ) -> Result<Option<ClaimedSource>>;

    async fn update_last_fetched(
        &self,
        tx: &mut Self::Tx,
        source_id: Uuid,
        ts: NaiveDateTime,
    ) -> Result<()>;

    async fn article_url_exists(&self, tx: &mut Self::Tx, url: &str) -> Result<bool>;
    async fn insert_article(&self, tx: &mut Self::Tx, article: &NewArticle)
    -> Result<ArticleInsert>;

    /// All articles not yet attached to a digest, newest fetch first.
    async fn unprocessed_articles(&self) -> Result<Vec<Article>>;
    async fn digest_exists_for_date(&self, date: NaiveDate) -> Result<bool>;

    /// Insert the digest row and attach the given articles (setting both
    /// `digest_id` and `summary`) in one transaction. A unique violation on
    /// the digest date is reported as `DateConflict`, not an error.
    async fn create_digest(
        &self,
        digest: &Digest,
        articles: &[(Uuid, Option<String>)],
    ) -> Result<DigestInsert>;

    async fn set_digest_notified(&self, digest_id: Uuid, ts: NaiveDateTime) -> Result<()>;

    /// Raw settings rows as stored (JSON envelope `{"value": …}` per key).
    async fn get_setting(&self, key: &str) -> Result<Option<Value>>;
    async fn upsert_setting(&self, key: &str, value: &Value, updated_at: NaiveDateTime)
    -> Result<()>;
    async fn delete_setting(&self, key: &str) -> Result<()>;
    async fn all_settings(&self) -> Result<HashMap<String, Value>>;

    async fn insert_job_run(&self, run: &JobRun) -> Result<()>;
    async fn finish_job_run(
        &self,
        run_id: Uuid,
        status: JobStatus,
        finished_at: NaiveDateTime,
        details: Option<Value>,
        error_message: Option<String>,
    ) -> Result<()>;
    async fn latest_job_run(&self, job_name: &str) -> Result<Option<JobRun>>;
}

// ============================================================================
// Test utilities — InMemoryStore for in-crate tests
// ============================================================================

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use crate::types::Category;
    use anyhow::anyhow;
    use chrono::Duration;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct State {
        categories: HashMap<Uuid, Category>,
        sources: HashMap<Uuid, crate::types::Source>,
        articles: Vec<Article>,
        digests: Vec<Digest>,
        settings: HashMap<String, Value>,
        job_runs: Vec<JobRun>,
        locked: HashSet<Uuid>,
    }

    /// In-memory `Store` with real claim-lock semantics: a claimed source id
    /// is skipped by other transactions until committed or rolled back, and
    /// fetch-path writes are buffered until commit.
    #[derive(Default)]
    pub(crate) struct InMemoryStore {
        state: Mutex<State>,
    }

    #[derive(Default)]
    pub(crate) struct MemTx {
        claimed: Vec<Uuid>,
        staged_articles: Vec<Article>,
        staged_last_fetched: Vec<(Uuid, NaiveDateTime)>,
    }

    impl InMemoryStore {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn with_category(self, category: Category) -> Self {
            self.state
                .lock()
                .unwrap()
                .categories
                .insert(category.id, category);
            self
        }

        pub(crate) fn with_source(self, source: crate::types::Source) -> Self {
            self.state.lock().unwrap().sources.insert(source.id, source);
            self
        }

        pub(crate) fn with_article(self, article: Article) -> Self {
            self.state.lock().unwrap().articles.push(article);
            self
        }

        pub(crate) fn with_digest(self, digest: Digest) -> Self {
            self.state.lock().unwrap().digests.push(digest);
            self
        }

        pub(crate) fn with_setting(self, key: &str, envelope: Value) -> Self {
            self.state
                .lock()
                .unwrap()
                .settings
                .insert(key.to_string(), envelope);
            self
        }

        pub(crate) fn source(&self, id: Uuid) -> Option<crate::types::Source> {
            self.state.lock().unwrap().sources.get(&id).cloned()
        }

        pub(crate) fn articles(&self) -> Vec<Article> {
            self.state.lock().unwrap().articles.clone()
        }

        pub(crate) fn digests(&self) -> Vec<Digest> {
            self.state.lock().unwrap().digests.clone()
        }

        pub(crate) fn job_runs(&self) -> Vec<JobRun> {
            self.state.lock().unwrap().job_runs.clone()
        }

        pub(crate) fn locked_count(&self) -> usize {
            self.state.lock().unwrap().locked.len()
        }

        fn is_due(source: &crate::types::Source, now: NaiveDateTime) -> bool {
            source.enabled
                && match source.last_fetched_at {
                    None => true,
                    Some(last) => {
                        last <= now - Duration::minutes(i64::from(source.fetch_interval_minutes))
                    }
                }
        }
    }

    impl Store for InMemoryStore {
        type Tx = MemTx;

        async fn begin(&self) -> Result<Self::Tx> {
            Ok(MemTx::default())
        }

        async fn commit(&self, tx: Self::Tx) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            for (id, ts) in tx.staged_last_fetched {
                if let Some(source) = state.sources.get_mut(&id) {
                    source.last_fetched_at = Some(ts);
                }
            }
            for article in tx.staged_articles {
                if !state.articles.iter().any(|a| a.url == article.url) {
                    state.articles.push(article);
                }
            }
            for id in tx.claimed {
                state.locked.remove(&id);
            }
            Ok(())
        }

        async fn rollback(&self, tx: Self::Tx) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            for id in tx.claimed {
                state.locked.remove(&id);
            }
            Ok(())
        }

        async fn claim_next_due_source(
            &self,
            tx: &mut Self::Tx,
            now: NaiveDateTime,
            exclude: &[Uuid],
        ) -> Result<Option<ClaimedSource>> {
            let mut state = self.state.lock().unwrap();
            let mut due: Vec<crate::types::Source> = state
                .sources
                .values()
                .filter(|s| Self::is_due(s, now))
                .filter(|s| !state.locked.contains(&s.id))
                .filter(|s| !exclude.contains(&s.id))
                .cloned()
                .collect();
            due.sort_by_key(|s| (s.last_fetched_at, s.id));

            let Some(source) = due.into_iter().next() else {
                return Ok(None);
            };
            let category = state
                .categories
                .get(&source.category_id)
                .cloned()
                .ok_or_else(|| anyhow!("category not found: {}", source.category_id))?;

            state.locked.insert(source.id);
            tx.claimed.push(source.id);
            Ok(Some(ClaimedSource { source, category }))
        }

        async fn get_source_for_update(
            &self,
            tx: &mut Self::Tx,
            source_id: Uuid,
        ) -> Result<Option<ClaimedSource>> {
            let mut state = self.state.lock().unwrap();
            if state.locked.contains(&source_id) {
                anyhow::bail!("source {} is locked by another transaction", source_id);
            }
            let Some(source) = state.sources.get(&source_id).cloned() else {
                return Ok(None);
            };
            let category = state
                .categories
                .get(&source.category_id)
                .cloned()
                .ok_or_else(|| anyhow!("category not found: {}", source.category_id))?;

            state.locked.insert(source_id);
            tx.claimed.push(source_id);
            Ok(Some(ClaimedSource { source, category }))
        }

        async fn update_last_fetched(
            &self,
            tx: &mut Self::Tx,
            source_id: Uuid,
            ts: NaiveDateTime,
        ) -> Result<()> {
            tx.staged_last_fetched.push((source_id, ts));
            Ok(())
        }

        async fn article_url_exists(&self, tx: &mut Self::Tx, url: &str) -> Result<bool> {
            let state = self.state.lock().unwrap();
            Ok(state.articles.iter().any(|a| a.url == url)
                || tx.staged_articles.iter().any(|a| a.url == url))
        }

        async fn insert_article(
            &self,
            tx: &mut Self::Tx,
            article: &NewArticle,
        ) -> Result<ArticleInsert> {
            let state = self.state.lock().unwrap();
            if state.articles.iter().any(|a| a.url == article.url)
                || tx.staged_articles.iter().any(|a| a.url == article.url)
            {
                return Ok(ArticleInsert::DuplicateUrl);
            }
            drop(state);
            tx.staged_articles.push(Article {
                id: article.id,
                source_id: article.source_id,
                url: article.url.clone(),
                title: article.title.clone(),
                raw_content: article.raw_content.clone(),
                summary: None,
                digest_section: article.digest_section.clone(),
                relevance_score: None,
                published_at: article.published_at,
                fetched_at: article.fetched_at,
                digest_id: None,
            });
            Ok(ArticleInsert::Inserted)
        }

        async fn unprocessed_articles(&self) -> Result<Vec<Article>> {
            let state = self.state.lock().unwrap();
            let mut articles: Vec<Article> = state
                .articles
                .iter()
                .filter(|a| a.digest_id.is_none())
                .cloned()
                .collect();
            articles.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at));
            Ok(articles)
        }

        async fn digest_exists_for_date(&self, date: NaiveDate) -> Result<bool> {
            let state = self.state.lock().unwrap();
            Ok(state.digests.iter().any(|d| d.date == date))
        }

        async fn create_digest(
            &self,
            digest: &Digest,
            articles: &[(Uuid, Option<String>)],
        ) -> Result<DigestInsert> {
            let mut state = self.state.lock().unwrap();
            if state.digests.iter().any(|d| d.date == digest.date) {
                return Ok(DigestInsert::DateConflict);
            }
            state.digests.push(digest.clone());
            for (article_id, summary) in articles {
                if let Some(article) = state.articles.iter_mut().find(|a| a.id == *article_id) {
                    article.digest_id = Some(digest.id);
                    article.summary = summary.clone();
                }
            }
            Ok(DigestInsert::Created)
        }

        async fn set_digest_notified(&self, digest_id: Uuid, ts: NaiveDateTime) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if let Some(digest) = state.digests.iter_mut().find(|d| d.id == digest_id) {
                digest.notified_at = Some(ts);
            }
            Ok(())
        }

        async fn get_setting(&self, key: &str) -> Result<Option<Value>> {
            Ok(self.state.lock().unwrap().settings.get(key).cloned())
        }

        async fn upsert_setting(
            &self,
            key: &str,
            value: &Value,
            _updated_at: NaiveDateTime,
        ) -> Result<()> {
            self.state
                .lock()
                .unwrap()
                .settings
                .insert(key.to_string(), value.clone());
            Ok(())
        }

        async fn delete_setting(&self, key: &str) -> Result<()> {
            self.state.lock().unwrap().settings.remove(key);
            Ok(())
        }

        async fn all_settings(&self) -> Result<HashMap<String, Value>> {
            Ok(self.state.lock().unwrap().settings.clone())
        }

        async fn insert_job_run(&self, run: &JobRun) -> Result<()> {
            self.state.lock().unwrap().job_runs.push(run.clone());
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
            let mut state = self.state.lock().unwrap();
            if let Some(run) = state.job_runs.iter_mut().find(|r| r.id == run_id) {
                run.status = status;
                run.finished_at = Some(finished_at);
                if let Some(details) = details {
                    run.details = details;
                }
                if let Some(error_message) = error_message {
                    run.error_message = Some(error_message);
                }
            }
            Ok(())
        }

        async fn latest_job_run(&self, job_name: &str) -> Result<Option<JobRun>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .job_runs
                .iter()
                .filter(|r| r.job_name == job_name)
                .max_by_key(|r| r.started_at)
                .cloned())
        }
    }
}
