use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Where a source's content comes from. Only `website` has a working
/// extractor; the other variants are declared for forward compatibility and
/// rejected by the fetch manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "sourcetype", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Website,
    Twitter,
    Reddit,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Website => "website",
            Self::Twitter => "twitter",
            Self::Reddit => "reddit",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SourceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "website" => Ok(Self::Website),
            "twitter" => Ok(Self::Twitter),
            "reddit" => Ok(Self::Reddit),
            other => anyhow::bail!("unknown source type: {}", other),
        }
    }
}

/// Workflow state of a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "digeststatus", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DigestStatus {
    Building,
    Ready,
    Published,
}

impl fmt::Display for DigestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Building => "building",
            Self::Ready => "ready",
            Self::Published => "published",
        };
        write!(f, "{}", s)
    }
}

/// Terminal and non-terminal states of a background job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Success,
    Error,
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parse failure for a stored job status. Concrete error type so sqlx can box
/// it when decoding a row.
#[derive(Debug, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct ParseJobStatusError(String);

impl TryFrom<String> for JobStatus {
    type Error = ParseJobStatusError;

    fn try_from(s: String) -> Result<Self, ParseJobStatusError> {
        match s.as_str() {
            "running" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Success),
            "error" => Ok(JobStatus::Error),
            "skipped" => Ok(JobStatus::Skipped),
            _ => Err(ParseJobStatusError(s)),
        }
    }
}

/// A content category. Groups sources and pins their articles to a section of
/// the digest.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub digest_section: String,
    pub keywords: Vec<String>,
    pub created_at: NaiveDateTime,
}

/// A configured content source: where to fetch, how often, and what keywords
/// to filter by.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Source {
    pub id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub url: String,
    pub source_type: SourceType,
    pub keywords: Vec<String>,
    pub enabled: bool,
    pub fetch_interval_minutes: i32,
    pub last_fetched_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// A source claimed for fetching, joined with its category. The category
/// supplies the digest section and the second half of the keyword set.
#[derive(Debug, Clone)]
pub struct ClaimedSource {
    pub source: Source,
    pub category: Category,
}

/// A fetched article. `digest_id` is null until the article is picked up by a
/// digest, and set exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Article {
    pub id: Uuid,
    pub source_id: Uuid,
    pub url: String,
    pub title: String,
    pub raw_content: Option<String>,
    pub summary: Option<String>,
    pub digest_section: Option<String>,
    pub relevance_score: Option<f64>,
    pub published_at: Option<NaiveDateTime>,
    pub fetched_at: NaiveDateTime,
    pub digest_id: Option<Uuid>,
}

/// An article about to be inserted by the fetch manager.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub id: Uuid,
    pub source_id: Uuid,
    pub url: String,
    pub title: String,
    pub raw_content: Option<String>,
    pub digest_section: Option<String>,
    pub published_at: Option<NaiveDateTime>,
    pub fetched_at: NaiveDateTime,
}

/// One day's digest. `date` is unique; that constraint is the serialization
/// point for concurrent generation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Digest {
    pub id: Uuid,
    pub date: NaiveDate,
    pub status: DigestStatus,
    pub html_path: Option<String>,
    pub created_at: NaiveDateTime,
    pub published_at: Option<NaiveDateTime>,
    pub notified_at: Option<NaiveDateTime>,
}

/// One row in the append-only job-run ledger. Terminal fields are written at
/// most once; a run is never mutated after `finished_at` is set.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRun {
    pub id: Uuid,
    pub job_name: String,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub details: serde_json::Value,
    pub error_message: Option<String>,
}
