use crate::clock::Clock;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::settings::SettingsService;
use crate::storage::Store;
use anyhow::{Result, anyhow};
use serde_json::Value;
use tracing::{debug, warn};

const SUMMARY_TEMPERATURE: f64 = 0.2;
const SUMMARY_MAX_TOKENS: u32 = 200;

const SUMMARY_PROMPT: &str = "You are a technical news summarizer. Your task is to write a concise \
2-3 sentence summary of the following article.

Rules:
- Write exactly 2-3 sentences
- Focus on the main point and key facts
- Be objective and factual
- Do not include opinions or speculation
- Do not mention that this is a summary

Article Title: {title}

Article Content:
{content}

Respond with JSON only:
{\"summary\": \"Your 2-3 sentence summary here\"}";

/// Result of summarizing one article. `summary` is never empty: it falls back
/// to the title when the model fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryResult {
    pub summary: String,
    pub title: String,
    pub url: String,
}

// ============================================================================
// SummarizerService — total-function adapter
// ============================================================================

/// Summarizes articles with the configured model. Provider and tier are read
/// from settings on every call and passed through to the model. This never
/// fails: any error falls back to using the article title as the summary.
pub struct SummarizerService<S, M, C> {
    settings: SettingsService<S, C>,
    model: M,
}

impl<S: Store, M: LanguageModel, C: Clock> SummarizerService<S, M, C> {
    pub fn new(settings: SettingsService<S, C>, model: M) -> Self {
        Self { settings, model }
    }

    pub async fn summarize(&self, title: &str, content: &str, url: &str) -> SummaryResult {
        match self.try_summarize(title, content).await {
            Ok(summary) => SummaryResult {
                summary,
                title: title.to_string(),
                url: url.to_string(),
            },
            Err(err) => {
                warn!(title, error = %err, "summarization failed, falling back to title");
                SummaryResult {
                    summary: title.to_string(),
                    title: title.to_string(),
                    url: url.to_string(),
                }
            }
        }
    }

    async fn try_summarize(&self, title: &str, content: &str) -> Result<String> {
        let provider = self.settings.summarizer_provider().await?;
        let tier = self.settings.summarizer_tier().await?;
        debug!(title, provider, tier, "summarizing article");

        let prompt = SUMMARY_PROMPT
            .replace("{title}", title)
            .replace("{content}", content);

        let request = CompletionRequest {
            provider,
            tier,
            prompt,
            temperature: SUMMARY_TEMPERATURE,
            max_tokens: SUMMARY_MAX_TOKENS,
        };
        let result = self.model.complete_json(&request).await?;

        let summary = result
            .get("summary")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("empty or invalid summary in model response"))?;
        Ok(summary.to_string())
    }
}
