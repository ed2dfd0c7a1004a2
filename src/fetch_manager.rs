use crate::article_extractor::{ArticleExtractor, DEFAULT_MAX_ARTICLES, ExtractedArticle};
use crate::clock::Clock;
use crate::storage::{ArticleInsert, Store};
use crate::types::{ClaimedSource, NewArticle, SourceType};
use anyhow::{Result, bail};
use chrono::{Duration, NaiveDateTime};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Statistics for one fetch cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchStats {
    pub sources_checked: u32,
    pub sources_fetched: u32,
    pub articles_found: u32,
    pub articles_new: u32,
    pub articles_filtered: u32,
    pub articles_old: u32,
    pub errors: Vec<String>,
}

/// Statistics for a single source within a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub found: u32,
    pub saved: u32,
    pub filtered: u32,
    pub old: u32,
    pub duplicate: u32,
}

// ============================================================================
// FetchManager
// ============================================================================

/// Drives fetch cycles: claims due sources one at a time under row locks,
/// runs the extractor, applies the de-duplication → recency → keyword filter
/// gates in that order, persists survivors, and stamps `last_fetched_at`.
pub struct FetchManager<S, E, C> {
    store: Arc<S>,
    extractor: E,
    clock: C,
    max_articles_per_source: usize,
}

impl<S: Store, E: ArticleExtractor, C: Clock> FetchManager<S, E, C> {
    pub fn new(store: Arc<S>, extractor: E, clock: C) -> Self {
        Self {
            store,
            extractor,
            clock,
            max_articles_per_source: DEFAULT_MAX_ARTICLES,
        }
    }

    /// Run one cycle: claim and fetch up to `max_sources` due sources. Each
    /// source is processed inside its own transaction; a failure rolls that
    /// transaction back (releasing the claim) and the cycle moves on.
    pub async fn fetch_due_sources(&self, max_sources: usize) -> Result<FetchStats> {
        let mut stats = FetchStats::default();
        let mut attempted: Vec<Uuid> = Vec::new();

        for _ in 0..max_sources {
            let now = self.clock.now_utc();
            let mut tx = self.store.begin().await?;

            let claimed = match self
                .store
                .claim_next_due_source(&mut tx, now, &attempted)
                .await
            {
                Ok(Some(claimed)) => claimed,
                Ok(None) => {
                    self.store.rollback(tx).await.ok();
                    break;
                }
                Err(err) => {
                    self.store.rollback(tx).await.ok();
                    return Err(err);
                }
            };

            attempted.push(claimed.source.id);
            stats.sources_checked += 1;

            match self.fetch_claimed(&mut tx, &claimed, now).await {
                Ok(source_stats) => {
                    self.store.commit(tx).await?;
                    stats.sources_fetched += 1;
                    stats.articles_found += source_stats.found;
                    stats.articles_new += source_stats.saved;
                    stats.articles_filtered += source_stats.filtered;
                    stats.articles_old += source_stats.old;
                }
                Err(err) => {
                    error!(source = %claimed.source.name, error = %err, "error fetching source");
                    stats.errors.push(format!("{}: {}", claimed.source.name, err));
                    self.store.rollback(tx).await.ok();
                }
            }
        }

        Ok(stats)
    }

    /// Force-fetch a specific source, ignoring its cadence. One locked
    /// iteration of the cycle without the due predicate.
    pub async fn fetch_source(&self, source_id: Uuid) -> Result<SourceStats> {
        let now = self.clock.now_utc();
        let mut tx = self.store.begin().await?;

        let claimed = match self.store.get_source_for_update(&mut tx, source_id).await {
            Ok(Some(claimed)) => claimed,
            Ok(None) => {
                self.store.rollback(tx).await.ok();
                bail!("source not found: {}", source_id);
            }
            Err(err) => {
                self.store.rollback(tx).await.ok();
                return Err(err);
            }
        };

        match self.fetch_claimed(&mut tx, &claimed, now).await {
            Ok(source_stats) => {
                self.store.commit(tx).await?;
                Ok(source_stats)
            }
            Err(err) => {
                self.store.rollback(tx).await.ok();
                Err(err)
            }
        }
    }

    async fn fetch_claimed(
        &self,
        tx: &mut S::Tx,
        claimed: &ClaimedSource,
        now: NaiveDateTime,
    ) -> Result<SourceStats> {
        let source = &claimed.source;
        info!(source = %source.name, source_type = %source.source_type, "fetching source");

        let candidates = match source.source_type {
            SourceType::Website => {
                self.extractor
                    .fetch_articles(&source.url, self.max_articles_per_source)
                    .await?
            }
            SourceType::Twitter => bail!("twitter source fetching is not implemented"),
            SourceType::Reddit => bail!("reddit source fetching is not implemented"),
        };

        let mut stats = SourceStats {
            found: candidates.len() as u32,
            ..SourceStats::default()
        };

        // First fetch looks back 24h; after that, everything since the last
        // fetch. Candidates without a publish date always pass.
        let cutoff = source
            .last_fetched_at
            .unwrap_or_else(|| now - Duration::hours(24));

        for candidate in &candidates {
            if self.store.article_url_exists(tx, &candidate.url).await? {
                debug!(url = %candidate.url, "skipping duplicate");
                stats.duplicate += 1;
                continue;
            }

            if let Some(published_at) = candidate.published_at {
                if published_at < cutoff {
                    debug!(title = %candidate.title, %published_at, "filtered by date");
                    stats.old += 1;
                    continue;
                }
            }

            if !matches_keywords(candidate, claimed) {
                debug!(title = %candidate.title, "filtered by keywords");
                stats.filtered += 1;
                continue;
            }

            let article = NewArticle {
                id: Uuid::new_v4(),
                source_id: source.id,
                url: candidate.url.clone(),
                title: candidate.title.clone(),
                raw_content: Some(candidate.content.clone()),
                digest_section: Some(claimed.category.digest_section.clone()),
                published_at: candidate.published_at,
                fetched_at: now,
            };
            match self.store.insert_article(tx, &article).await? {
                ArticleInsert::Inserted => stats.saved += 1,
                // Lost a race with another worker; same as a duplicate.
                ArticleInsert::DuplicateUrl => stats.duplicate += 1,
            }
        }

        self.store.update_last_fetched(tx, source.id, now).await?;

        info!(
            source = %source.name,
            found = stats.found,
            saved = stats.saved,
            filtered = stats.filtered,
            old = stats.old,
            duplicate = stats.duplicate,
            "source fetched"
        );
        Ok(stats)
    }
}

/// Keyword gate: the union of source and category keywords, matched
/// case-insensitively against title + content. No keywords means everything
/// passes.
fn matches_keywords(candidate: &ExtractedArticle, claimed: &ClaimedSource) -> bool {
    let keywords: Vec<&String> = claimed
        .source
        .keywords
        .iter()
        .chain(claimed.category.keywords.iter())
        .collect();
    if keywords.is_empty() {
        return true;
    }

    let text = format!("{} {}", candidate.title, candidate.content).to_lowercase();
    keywords.iter().any(|kw| text.contains(&kw.to_lowercase()))
}
