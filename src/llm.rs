use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Value, json};
use std::env;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One summarization call to the backing model. `provider` and `tier` come
/// from settings on every call; the router picks the backend from them.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub provider: String,
    pub tier: String,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Black-box language model returning a JSON object for a prompt.
#[allow(async_fn_in_trait)]
pub trait LanguageModel: Send + Sync {
    async fn complete_json(&self, request: &CompletionRequest) -> Result<Value>;
}

/// Resolve the model name for a provider/tier pair. An env override of the
/// form `<PROVIDER>_MODEL_<TIER>` wins over the built-in default.
fn tier_model(prefix: &str, tier: &str, fast: &str, smart: &str, smartest: &str) -> String {
    let var = format!("{}_MODEL_{}", prefix, tier.to_uppercase());
    env::var(var).unwrap_or_else(|_| {
        match tier {
            "smart" => smart,
            "smartest" => smartest,
            _ => fast,
        }
        .to_string()
    })
}

fn parse_model_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).context("model output is not valid JSON")
}

// ============================================================================
// Response extraction — one pure helper per provider wire format
// ============================================================================

fn anthropic_completion_text(payload: &Value) -> Result<&str> {
    payload
        .get("content")
        .and_then(Value::as_array)
        .and_then(|blocks| {
            blocks
                .iter()
                .find(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        })
        .and_then(|b| b.get("text"))
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("anthropic response missing text content"))
}

fn openai_completion_text(payload: &Value) -> Result<&str> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("openai response missing completion text"))
}

fn google_completion_text(payload: &Value) -> Result<&str> {
    payload
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("google response missing completion text"))
}

fn ollama_completion_text(payload: &Value) -> Result<&str> {
    payload
        .get("response")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("ollama response missing completion text"))
}

// ============================================================================
// AnthropicModel — Messages API
// ============================================================================

pub struct AnthropicModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicModel {
    pub fn from_env() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            base_url: env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
        }
    }

    fn model_for_tier(tier: &str) -> String {
        tier_model(
            "ANTHROPIC",
            tier,
            "claude-haiku-4-5",
            "claude-sonnet-4-6",
            "claude-opus-4-6",
        )
    }
}

impl LanguageModel for AnthropicModel {
    async fn complete_json(&self, request: &CompletionRequest) -> Result<Value> {
        if self.api_key.is_empty() {
            bail!("ANTHROPIC_API_KEY is not set");
        }
        let body = json!({
            "model": Self::model_for_tier(&request.tier),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{"role": "user", "content": request.prompt}],
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("anthropic request failed")?
            .error_for_status()
            .context("anthropic returned an error status")?;

        let payload: Value = response.json().await.context("invalid anthropic response")?;
        parse_model_json(anthropic_completion_text(&payload)?)
    }
}

// ============================================================================
// OpenAiModel — chat completions API
// ============================================================================

pub struct OpenAiModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiModel {
    pub fn from_env() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
        }
    }

    fn model_for_tier(tier: &str) -> String {
        tier_model("OPENAI", tier, "gpt-4o-mini", "gpt-4o", "gpt-4o")
    }
}

impl LanguageModel for OpenAiModel {
    async fn complete_json(&self, request: &CompletionRequest) -> Result<Value> {
        if self.api_key.is_empty() {
            bail!("OPENAI_API_KEY is not set");
        }
        let body = json!({
            "model": Self::model_for_tier(&request.tier),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "response_format": {"type": "json_object"},
            "messages": [{"role": "user", "content": request.prompt}],
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("openai request failed")?
            .error_for_status()
            .context("openai returned an error status")?;

        let payload: Value = response.json().await.context("invalid openai response")?;
        parse_model_json(openai_completion_text(&payload)?)
    }
}

// ============================================================================
// GoogleModel — Gemini generateContent API
// ============================================================================

pub struct GoogleModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleModel {
    pub fn from_env() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
        }
    }

    fn model_for_tier(tier: &str) -> String {
        tier_model(
            "GEMINI",
            tier,
            "gemini-2.0-flash",
            "gemini-2.5-flash",
            "gemini-2.5-pro",
        )
    }
}

impl LanguageModel for GoogleModel {
    async fn complete_json(&self, request: &CompletionRequest) -> Result<Value> {
        if self.api_key.is_empty() {
            bail!("GEMINI_API_KEY is not set");
        }
        let body = json!({
            "contents": [{"parts": [{"text": request.prompt}]}],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens,
                "responseMimeType": "application/json",
            },
        });

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url,
                Self::model_for_tier(&request.tier)
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("google request failed")?
            .error_for_status()
            .context("google returned an error status")?;

        let payload: Value = response.json().await.context("invalid google response")?;
        parse_model_json(google_completion_text(&payload)?)
    }
}

// ============================================================================
// OllamaModel — local model over the Ollama HTTP API
// ============================================================================

pub struct OllamaModel {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaModel {
    pub fn from_env() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
        }
    }

    fn model_for_tier(tier: &str) -> String {
        tier_model("OLLAMA", tier, "llama3.2:3b", "llama3.1:8b", "llama3.3:70b")
    }
}

impl LanguageModel for OllamaModel {
    async fn complete_json(&self, request: &CompletionRequest) -> Result<Value> {
        let body = json!({
            "model": Self::model_for_tier(&request.tier),
            "prompt": request.prompt,
            "stream": false,
            "format": "json",
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .context("ollama request failed")?
            .error_for_status()
            .context("ollama returned an error status")?;

        let payload: Value = response.json().await.context("invalid ollama response")?;
        parse_model_json(ollama_completion_text(&payload)?)
    }
}

// ============================================================================
// LlmRouter — provider dispatch
// ============================================================================

/// Routes a completion to the backend named by `request.provider`. Backends
/// read their credentials from the environment; a provider selected in
/// settings without credentials configured fails the call, which callers
/// degrade from (the summarizer falls back to the article title).
pub struct LlmRouter {
    anthropic: AnthropicModel,
    openai: OpenAiModel,
    google: GoogleModel,
    ollama: OllamaModel,
}

impl LlmRouter {
    pub fn from_env() -> Self {
        Self {
            anthropic: AnthropicModel::from_env(),
            openai: OpenAiModel::from_env(),
            google: GoogleModel::from_env(),
            ollama: OllamaModel::from_env(),
        }
    }
}

impl LanguageModel for LlmRouter {
    async fn complete_json(&self, request: &CompletionRequest) -> Result<Value> {
        match request.provider.as_str() {
            "anthropic" => self.anthropic.complete_json(request).await,
            "openai" => self.openai.complete_json(request).await,
            "google" => self.google.complete_json(request).await,
            "ollama" => self.ollama.complete_json(request).await,
            other => bail!("unknown summarizer provider: {}", other),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn request(provider: &str) -> CompletionRequest {
        CompletionRequest {
            provider: provider.to_string(),
            tier: "fast".to_string(),
            prompt: "summarize".to_string(),
            temperature: 0.2,
            max_tokens: 200,
        }
    }

    #[tokio::test]
    async fn router_rejects_unknown_provider() {
        let router = LlmRouter::from_env();
        let err = router.complete_json(&request("bedrock")).await.unwrap_err();
        assert!(err.to_string().contains("unknown summarizer provider"));
    }

    #[test]
    fn anthropic_text_extraction() {
        let payload = json!({
            "content": [
                {"type": "thinking", "thinking": ""},
                {"type": "text", "text": "{\"summary\": \"s\"}"},
            ],
        });
        assert_eq!(
            anthropic_completion_text(&payload).unwrap(),
            "{\"summary\": \"s\"}"
        );
        assert!(anthropic_completion_text(&json!({"content": []})).is_err());
    }

    #[test]
    fn openai_text_extraction() {
        let payload = json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"summary\": \"s\"}"}}],
        });
        assert_eq!(
            openai_completion_text(&payload).unwrap(),
            "{\"summary\": \"s\"}"
        );
        assert!(openai_completion_text(&json!({"choices": []})).is_err());
    }

    #[test]
    fn google_text_extraction() {
        let payload = json!({
            "candidates": [{"content": {"parts": [{"text": "{\"summary\": \"s\"}"}]}}],
        });
        assert_eq!(
            google_completion_text(&payload).unwrap(),
            "{\"summary\": \"s\"}"
        );
        assert!(google_completion_text(&json!({})).is_err());
    }

    #[test]
    fn ollama_text_extraction() {
        let payload = json!({"response": "{\"summary\": \"s\"}", "done": true});
        assert_eq!(
            ollama_completion_text(&payload).unwrap(),
            "{\"summary\": \"s\"}"
        );
        assert!(ollama_completion_text(&json!({"done": true})).is_err());
    }

    #[test]
    fn model_output_must_be_json() {
        assert_eq!(
            parse_model_json("{\"summary\": \"s\"}").unwrap(),
            json!({"summary": "s"})
        );
        assert!(parse_model_json("Here is the summary: ...").is_err());
    }

    #[test]
    fn tier_model_falls_back_per_tier() {
        // Only meaningful when the override variables are unset, which is the
        // normal test environment.
        if env::var("OLLAMA_MODEL_FAST").is_err() {
            assert_eq!(OllamaModel::model_for_tier("fast"), "llama3.2:3b");
            assert_eq!(OllamaModel::model_for_tier("smartest"), "llama3.3:70b");
        }
    }
}
