use crate::clock::Clock;
use crate::llm::LanguageModel;
use crate::notifier::Notifier;
use crate::settings::SettingsService;
use crate::storage::{DigestInsert, Store};
use crate::summarizer::SummarizerService;
use crate::types::{Article, Digest, DigestStatus};
use anyhow::Context;
use askama::Template;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Default output directory for digest HTML artifacts.
pub const DIGESTS_DIR: &str = "data/digests";

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("no unprocessed articles available for digest generation")]
    NoUnprocessedArticles,
    #[error("no unprocessed articles match the enabled digest sections: {sections}")]
    NoMatchingSections { sections: String },
    #[error("a digest already exists for {0}")]
    DateConflict(NaiveDate),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Template)]
#[template(path = "digest.html")]
struct DigestTemplate<'a> {
    date: &'a str,
    generated_at: &'a str,
    sections: &'a [SectionView],
}

struct SectionView {
    title: String,
    articles: Vec<ArticleView>,
}

struct ArticleView {
    url: String,
    title: String,
    summary: Option<String>,
}

/// Human-readable heading for a digest section label.
fn section_title(section: &str) -> String {
    section
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// DigestGenerator
// ============================================================================

/// Assembles the daily digest: collects unprocessed articles from enabled
/// sections, fills in missing summaries, renders the HTML artifact, and
/// atomically attaches the articles to a new digest row. The unique
/// constraint on the digest date is the final arbiter against races.
pub struct DigestGenerator<S, M, N, C> {
    store: Arc<S>,
    settings: SettingsService<S, C>,
    summarizer: SummarizerService<S, M, C>,
    notifier: N,
    clock: C,
    output_dir: PathBuf,
}

impl<S: Store, M: LanguageModel, N: Notifier, C: Clock> DigestGenerator<S, M, N, C> {
    pub fn new(
        store: Arc<S>,
        settings: SettingsService<S, C>,
        summarizer: SummarizerService<S, M, C>,
        notifier: N,
        clock: C,
    ) -> Self {
        Self {
            store,
            settings,
            summarizer,
            notifier,
            clock,
            output_dir: PathBuf::from(DIGESTS_DIR),
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub async fn generate(&self) -> Result<Digest, DigestError> {
        let articles = self.store.unprocessed_articles().await?;
        if articles.is_empty() {
            return Err(DigestError::NoUnprocessedArticles);
        }

        let enabled_sections = self.settings.digest_sections().await?;
        let mut articles: Vec<Article> = articles
            .into_iter()
            .filter(|a| {
                a.digest_section
                    .as_deref()
                    .is_some_and(|s| enabled_sections.iter().any(|e| e == s))
            })
            .collect();
        if articles.is_empty() {
            return Err(DigestError::NoMatchingSections {
                sections: enabled_sections.join(", "),
            });
        }

        // Articles without a summary but with content get one now. Articles
        // lacking both stay un-summarized and are still included.
        let mut summarized = 0;
        for article in &mut articles {
            if article.summary.is_none() {
                if let Some(content) = article.raw_content.as_deref() {
                    let result = self
                        .summarizer
                        .summarize(&article.title, content, &article.url)
                        .await;
                    article.summary = Some(result.summary);
                    summarized += 1;
                }
            }
        }
        info!(summarized, "summarized articles");

        let now = self.clock.now_utc();
        let today = now.date();

        let sections: Vec<SectionView> = enabled_sections
            .iter()
            .filter_map(|section| {
                let section_articles: Vec<ArticleView> = articles
                    .iter()
                    .filter(|a| a.digest_section.as_deref() == Some(section))
                    .map(|a| ArticleView {
                        url: a.url.clone(),
                        title: a.title.clone(),
                        summary: a.summary.clone(),
                    })
                    .collect();
                if section_articles.is_empty() {
                    None
                } else {
                    Some(SectionView {
                        title: section_title(section),
                        articles: section_articles,
                    })
                }
            })
            .collect();

        let html = DigestTemplate {
            date: &today.format("%B %d, %Y").to_string(),
            generated_at: &now.format("%Y-%m-%d %H:%M UTC").to_string(),
            sections: &sections,
        }
        .render()
        .context("failed to render digest template")?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("failed to create {}", self.output_dir.display()))?;
        let filename = format!("digest-{}.html", today.format("%Y-%m-%d"));
        let html_path = self.output_dir.join(&filename);
        tokio::fs::write(&html_path, &html)
            .await
            .with_context(|| format!("failed to write {}", html_path.display()))?;
        info!(path = %html_path.display(), "digest HTML saved");

        let mut digest = Digest {
            id: Uuid::new_v4(),
            date: today,
            status: DigestStatus::Ready,
            html_path: Some(html_path.to_string_lossy().into_owned()),
            created_at: now,
            published_at: None,
            notified_at: None,
        };

        let updates: Vec<(Uuid, Option<String>)> =
            articles.iter().map(|a| (a.id, a.summary.clone())).collect();
        match self.store.create_digest(&digest, &updates).await? {
            DigestInsert::Created => {}
            DigestInsert::DateConflict => return Err(DigestError::DateConflict(today)),
        }
        info!(
            digest_id = %digest.id,
            articles = articles.len(),
            sections = sections.len(),
            "digest created"
        );

        if self.settings.telegram_notifications().await? {
            let sent = self
                .notifier
                .send_digest_notification(&digest, articles.len())
                .await;
            if sent {
                let notified_at = self.clock.now_utc();
                self.store
                    .set_digest_notified(digest.id, notified_at)
                    .await?;
                digest.notified_at = Some(notified_at);
            }
        }

        Ok(digest)
    }
}
