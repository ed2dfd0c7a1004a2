use crate::link_extractor::extract_article_links;
use crate::page_fetcher::{FetcherConfig, PageFetcher};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use futures::StreamExt;
use scraper::{Html, Node, Selector};
use tracing::{error, info, warn};
use url::Url;

/// Default cap on candidates pulled from one listing page.
pub const DEFAULT_MAX_ARTICLES: usize = 20;

const DEFAULT_CONCURRENT_LIMIT: usize = 5;

/// Tags whose text never belongs in extracted article content.
const NON_CONTENT_TAGS: [&str; 11] = [
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "table", "figure",
    "iframe",
];

/// A candidate article pulled from a source.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedArticle {
    pub url: String,
    pub title: String,
    pub content: String,
    pub published_at: Option<NaiveDateTime>,
}

// ============================================================================
// ArticleExtractor trait
// ============================================================================

#[allow(async_fn_in_trait)]
pub trait ArticleExtractor: Send + Sync {
    /// Fetch up to `max_articles` candidate articles from a listing URL.
    /// Failures fetching individual articles drop that candidate; a failure
    /// fetching the listing itself yields an empty list.
    async fn fetch_articles(
        &self,
        listing_url: &str,
        max_articles: usize,
    ) -> Result<Vec<ExtractedArticle>>;
}

// ============================================================================
// WebsiteExtractor — website implementation
// ============================================================================

/// Extracts articles from a website: downloads the listing page, finds
/// candidate links, then fetches each article with bounded concurrency and
/// pulls out title, plain-text content, and a metadata publish date.
pub struct WebsiteExtractor {
    fetcher: PageFetcher,
    concurrent_limit: usize,
}

impl WebsiteExtractor {
    pub fn new() -> Result<Self> {
        Self::with_config(FetcherConfig::default())
    }

    pub fn with_config(config: FetcherConfig) -> Result<Self> {
        Ok(Self {
            fetcher: PageFetcher::new(config)?,
            concurrent_limit: DEFAULT_CONCURRENT_LIMIT,
        })
    }

    async fn fetch_single_article(&self, url: String) -> Option<ExtractedArticle> {
        let result = match self.fetcher.fetch(&url).await {
            Ok(result) => result,
            Err(err) => {
                warn!(url, error = %err, "failed to fetch article");
                return None;
            }
        };
        if !result.ok() {
            warn!(url, status = %result.status, "article fetch returned non-success status");
            return None;
        }
        if result.text.is_empty() {
            warn!(url, "empty response body");
            return None;
        }

        let article = extract_from_html(&url, &result.text);
        if article.is_none() {
            warn!(url, "could not extract content");
        }
        article
    }
}

impl ArticleExtractor for WebsiteExtractor {
    async fn fetch_articles(
        &self,
        listing_url: &str,
        max_articles: usize,
    ) -> Result<Vec<ExtractedArticle>> {
        let base_url = Url::parse(listing_url)
            .with_context(|| format!("invalid listing url: {}", listing_url))?;

        let listing = match self.fetcher.fetch(listing_url).await {
            Ok(result) if result.ok() => result,
            Ok(result) => {
                error!(listing_url, status = %result.status, "failed to fetch listing page");
                return Ok(Vec::new());
            }
            Err(err) => {
                error!(listing_url, error = %err, "failed to fetch listing page");
                return Ok(Vec::new());
            }
        };

        let mut links = extract_article_links(&listing.text, &base_url);
        info!(listing_url, count = links.len(), "found article links");
        links.truncate(max_articles);

        // buffered() bounds concurrency while preserving candidate order.
        let articles: Vec<ExtractedArticle> = futures::stream::iter(links)
            .map(|url| self.fetch_single_article(url))
            .buffered(self.concurrent_limit)
            .filter_map(|article| async move { article })
            .collect()
            .await;

        info!(listing_url, count = articles.len(), "extracted articles");
        Ok(articles)
    }
}

// ============================================================================
// HTML extraction helpers
// ============================================================================

fn extract_from_html(url: &str, html: &str) -> Option<ExtractedArticle> {
    let document = Html::parse_document(html);

    let content = extract_content(&document)?;
    let title = extract_title(&document).unwrap_or_else(|| url.to_string());
    let published_at = extract_published_at(&document);

    Some(ExtractedArticle {
        url: url.to_string(),
        title,
        content,
        published_at,
    })
}

/// Title fallback chain: OpenGraph metadata, then `<title>`, then the first
/// `<h1>`. The caller falls back to the URL itself when all are missing.
fn extract_title(document: &Html) -> Option<String> {
    let og_title = Selector::parse(r#"meta[property="og:title"]"#).expect("static selector");
    if let Some(meta) = document.select(&og_title).next() {
        if let Some(content) = meta.value().attr("content") {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }

    for selector in ["title", "h1"] {
        let selector = Selector::parse(selector).expect("static selector");
        if let Some(element) = document.select(&selector).next() {
            let text = element.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    None
}

/// Publish date from page metadata, kept only when it parses as an ISO-style
/// date. Unparseable dates degrade to `None` rather than failing extraction.
fn extract_published_at(document: &Html) -> Option<NaiveDateTime> {
    let candidates = [
        (r#"meta[property="article:published_time"]"#, "content"),
        (r#"meta[name="date"]"#, "content"),
        ("time[datetime]", "datetime"),
    ];
    for (selector, attr) in candidates {
        let selector = Selector::parse(selector).expect("static selector");
        if let Some(element) = document.select(&selector).next() {
            if let Some(raw) = element.value().attr(attr) {
                if let Some(parsed) = parse_metadata_date(raw.trim()) {
                    return Some(parsed);
                }
            }
        }
    }
    None
}

fn parse_metadata_date(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    None
}

/// Plain-text body content with scripts, styles, chrome, tables, and figures
/// removed. Returns `None` when nothing readable remains.
fn extract_content(document: &Html) -> Option<String> {
    let body = Selector::parse("body").expect("static selector");
    let body = document.select(&body).next()?;

    let mut chunks: Vec<String> = Vec::new();
    collect_text(*body, &mut chunks);

    let text = chunks.join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() { None } else { Some(text) }
}

fn collect_text(node: ego_tree::NodeRef<'_, Node>, chunks: &mut Vec<String>) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            }
            Node::Element(element) if NON_CONTENT_TAGS.contains(&element.name()) => {}
            Node::Element(_) => collect_text(child, chunks),
            _ => {}
        }
    }
}
