use anyhow::{Context, Result, anyhow};
use reqwest::{Client, StatusCode, redirect};
use std::time::Duration;
use tracing::warn;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Configuration for [`PageFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Result of fetching a URL. Non-success statuses are returned, not raised;
/// callers decide whether a 404 matters.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: String,
    pub status: StatusCode,
    pub text: String,
}

impl FetchResult {
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }
}

// ============================================================================
// PageFetcher — HTTP fetch primitive
// ============================================================================

/// Downloads pages with a realistic user agent, following redirects and
/// retrying transient network errors with linear backoff.
pub struct PageFetcher {
    client: Client,
    config: FetcherConfig,
}

impl PageFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .redirect(redirect::Policy::limited(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchResult> {
        let mut last_error = None;

        for attempt in 1..=self.config.max_retries {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    let final_url = response.url().to_string();
                    let text = response.text().await.unwrap_or_default();
                    return Ok(FetchResult {
                        url: final_url,
                        status,
                        text,
                    });
                }
                Err(err) => {
                    warn!(url, attempt, error = %err, "fetch attempt failed");
                    last_error = Some(err);
                }
            }

            if attempt < self.config.max_retries {
                tokio::time::sleep(self.config.retry_delay * attempt).await;
            }
        }

        Err(anyhow!(
            "failed to fetch {} after {} attempts: {}",
            url,
            self.config.max_retries,
            last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string())
        ))
    }
}
