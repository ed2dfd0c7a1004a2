use crate::clock::Clock;
use crate::storage::Store;
use anyhow::{Result, anyhow, bail};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub const VALID_PROVIDERS: [&str; 4] = ["anthropic", "openai", "google", "ollama"];
pub const VALID_TIERS: [&str; 3] = ["fast", "smart", "smartest"];
pub const SECTION_OPTIONS: [&str; 4] = ["security_news", "product_news", "market", "research"];

/// How a setting value is validated and rendered in the admin UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Number,
    Time,
    Boolean,
    MultiSelect,
    Text,
}

impl SettingKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Time => "time",
            Self::Boolean => "boolean",
            Self::MultiSelect => "multiselect",
            Self::Text => "text",
        }
    }
}

struct SettingSpec {
    key: &'static str,
    kind: SettingKind,
    description: &'static str,
    options: &'static [&'static str],
}

const SPECS: [SettingSpec; 7] = [
    SettingSpec {
        key: "fetch_interval_minutes",
        kind: SettingKind::Number,
        description: "How often to fetch new content (in minutes)",
        options: &[],
    },
    SettingSpec {
        key: "fetch_worker_count",
        kind: SettingKind::Number,
        description: "Number of parallel fetch workers to run",
        options: &[],
    },
    SettingSpec {
        key: "digest_time",
        kind: SettingKind::Time,
        description: "When to generate the daily digest (24-hour format, UTC)",
        options: &[],
    },
    SettingSpec {
        key: "telegram_notifications",
        kind: SettingKind::Boolean,
        description: "Send notifications via Telegram",
        options: &[],
    },
    SettingSpec {
        key: "digest_sections",
        kind: SettingKind::MultiSelect,
        description: "Which sections to include in the digest",
        options: &SECTION_OPTIONS,
    },
    SettingSpec {
        key: "summarizer_provider",
        kind: SettingKind::Text,
        description: "LLM provider for summarization (anthropic, openai, google, ollama)",
        options: &[],
    },
    SettingSpec {
        key: "summarizer_tier",
        kind: SettingKind::Text,
        description: "LLM model tier for summarization (fast, smart, smartest)",
        options: &[],
    },
];

fn spec(key: &str) -> Result<&'static SettingSpec> {
    SPECS
        .iter()
        .find(|s| s.key == key)
        .ok_or_else(|| anyhow!("unknown setting: {}", key))
}

fn default_value(key: &str) -> Value {
    match key {
        "fetch_interval_minutes" => json!(60),
        "fetch_worker_count" => json!(3),
        "digest_time" => json!("08:00"),
        "telegram_notifications" => json!(true),
        "digest_sections" => json!(["security_news", "product_news", "market"]),
        "summarizer_provider" => json!("ollama"),
        "summarizer_tier" => json!("fast"),
        _ => Value::Null,
    }
}

/// One entry in the `get_all` listing, shaped for the admin UI.
#[derive(Debug, Clone, Serialize)]
pub struct SettingInfo {
    pub value: Value,
    pub default: Value,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub options: Vec<String>,
    pub is_default: bool,
}

// ============================================================================
// SettingsService
// ============================================================================

/// Durable key→typed-value configuration with defaults. Values are persisted
/// as a JSON envelope `{"value": …}`; a missing row means the default
/// applies.
pub struct SettingsService<S, C> {
    store: Arc<S>,
    clock: C,
}

impl<S, C: Clone> Clone for SettingsService<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: self.clock.clone(),
        }
    }
}

impl<S: Store, C: Clock> SettingsService<S, C> {
    pub fn new(store: Arc<S>, clock: C) -> Self {
        Self { store, clock }
    }

    /// Get a setting value, falling back to the default when unset.
    /// Unknown keys are an error.
    pub async fn get(&self, key: &str) -> Result<Value> {
        spec(key)?;
        match self.store.get_setting(key).await? {
            Some(envelope) => Ok(envelope
                .get("value")
                .cloned()
                .unwrap_or_else(|| default_value(key))),
            None => Ok(default_value(key)),
        }
    }

    /// Validate and upsert a setting value.
    pub async fn set(&self, key: &str, value: Value) -> Result<()> {
        let spec = spec(key)?;
        validate_value(spec, &value)?;
        let envelope = json!({ "value": value });
        self.store
            .upsert_setting(key, &envelope, self.clock.now_utc())
            .await?;
        info!(key, %value, "setting updated");
        Ok(())
    }

    /// Remove the stored row so the default applies again.
    pub async fn reset(&self, key: &str) -> Result<()> {
        spec(key)?;
        self.store.delete_setting(key).await?;
        info!(key, "setting reset to default");
        Ok(())
    }

    /// Every recognized setting with its current value and metadata.
    pub async fn get_all(&self) -> Result<BTreeMap<String, SettingInfo>> {
        let stored = self.store.all_settings().await?;
        let mut all = BTreeMap::new();
        for spec in &SPECS {
            let envelope = stored.get(spec.key);
            let value = envelope
                .and_then(|e| e.get("value").cloned())
                .unwrap_or_else(|| default_value(spec.key));
            all.insert(
                spec.key.to_string(),
                SettingInfo {
                    value,
                    default: default_value(spec.key),
                    description: spec.description.to_string(),
                    kind: spec.kind.as_str().to_string(),
                    options: spec.options.iter().map(|s| s.to_string()).collect(),
                    is_default: envelope.is_none(),
                },
            );
        }
        Ok(all)
    }

    pub async fn digest_time(&self) -> Result<String> {
        Ok(serde_json::from_value(self.get("digest_time").await?)?)
    }

    pub async fn digest_sections(&self) -> Result<Vec<String>> {
        Ok(serde_json::from_value(self.get("digest_sections").await?)?)
    }

    pub async fn telegram_notifications(&self) -> Result<bool> {
        Ok(serde_json::from_value(self.get("telegram_notifications").await?)?)
    }

    pub async fn summarizer_provider(&self) -> Result<String> {
        Ok(serde_json::from_value(self.get("summarizer_provider").await?)?)
    }

    pub async fn summarizer_tier(&self) -> Result<String> {
        Ok(serde_json::from_value(self.get("summarizer_tier").await?)?)
    }
}

fn validate_value(spec: &SettingSpec, value: &Value) -> Result<()> {
    match spec.kind {
        SettingKind::Number => {
            let ok = value.as_i64().is_some_and(|n| n >= 1);
            if !ok {
                bail!("{} must be a positive integer", spec.key);
            }
        }
        SettingKind::Time => {
            let Some(s) = value.as_str() else {
                bail!("{} must be a string in HH:MM format", spec.key);
            };
            validate_hhmm(spec.key, s)?;
        }
        SettingKind::Boolean => {
            if !value.is_boolean() {
                bail!("{} must be a boolean", spec.key);
            }
        }
        SettingKind::MultiSelect => {
            let Some(items) = value.as_array() else {
                bail!("{} must be a list", spec.key);
            };
            for item in items {
                let ok = item
                    .as_str()
                    .is_some_and(|s| spec.options.contains(&s));
                if !ok {
                    bail!("invalid option for {}: {}", spec.key, item);
                }
            }
        }
        SettingKind::Text => {
            let Some(s) = value.as_str() else {
                bail!("{} must be a string", spec.key);
            };
            if spec.key == "summarizer_provider" && !VALID_PROVIDERS.contains(&s) {
                bail!(
                    "invalid provider '{}', must be one of: {}",
                    s,
                    VALID_PROVIDERS.join(", ")
                );
            }
            if spec.key == "summarizer_tier" && !VALID_TIERS.contains(&s) {
                bail!(
                    "invalid tier '{}', must be one of: {}",
                    s,
                    VALID_TIERS.join(", ")
                );
            }
        }
    }
    Ok(())
}

/// Strict HH:MM check: exactly five characters, 00:00 through 23:59.
fn validate_hhmm(key: &str, s: &str) -> Result<()> {
    let valid = s.len() == 5
        && s.as_bytes()[2] == b':'
        && s[..2].parse::<u32>().is_ok_and(|h| h <= 23)
        && s[3..].parse::<u32>().is_ok_and(|m| m <= 59);
    if !valid {
        bail!("{} must be in HH:MM format (00:00-23:59)", key);
    }
    Ok(())
}
