use crate::config::NotifierConfig;
use crate::types::Digest;
use serde_json::json;
use std::path::Path;
use tracing::{info, warn};

/// Best-effort outbound notification about a new digest. Implementations
/// never fail; they report success as a boolean.
#[allow(async_fn_in_trait)]
pub trait Notifier: Send + Sync {
    async fn send_digest_notification(&self, digest: &Digest, article_count: usize) -> bool;
}

// ============================================================================
// TelegramNotifier
// ============================================================================

/// Sends an HTML-formatted message with a link to the digest artifact to each
/// configured chat. Missing configuration or a failed send yields `false`
/// with a warning, never an error.
pub struct TelegramNotifier {
    client: reqwest::Client,
    token: String,
    chat_ids: Vec<i64>,
    base_url: String,
}

impl TelegramNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: config.telegram_token,
            chat_ids: config.telegram_chat_ids,
            base_url: config.base_url,
        }
    }

    pub fn from_env() -> Self {
        Self::new(NotifierConfig::from_env())
    }

    fn build_message(&self, digest: &Digest, article_count: usize) -> String {
        let plural = if article_count == 1 { "" } else { "s" };
        let mut message = format!(
            "<b>Security Digest — {}</b>\n\n{} article{}\n",
            digest.date, article_count, plural
        );

        let filename = digest
            .html_path
            .as_deref()
            .and_then(|p| Path::new(p).file_name())
            .map(|f| f.to_string_lossy().into_owned());
        if let Some(filename) = filename {
            if !self.base_url.is_empty() {
                message.push_str(&format!(
                    "\n<a href=\"{}/digests/{}\">View digest</a>",
                    self.base_url, filename
                ));
            }
        }
        message
    }
}

impl Notifier for TelegramNotifier {
    async fn send_digest_notification(&self, digest: &Digest, article_count: usize) -> bool {
        if self.token.is_empty() {
            warn!("Telegram token not configured, skipping notification");
            return false;
        }
        if self.chat_ids.is_empty() {
            warn!("no Telegram chat IDs configured, skipping notification");
            return false;
        }

        let message = self.build_message(digest, article_count);
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);

        for chat_id in &self.chat_ids {
            let result = self
                .client
                .post(&url)
                .json(&json!({
                    "chat_id": chat_id,
                    "text": message,
                    "parse_mode": "HTML",
                }))
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    warn!(chat_id, status = %response.status(), "failed to send Telegram notification");
                    return false;
                }
                Err(err) => {
                    warn!(chat_id, error = %err, "failed to send Telegram notification");
                    return false;
                }
            }
        }

        info!(recipients = self.chat_ids.len(), "digest notification sent");
        true
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted notifier that counts calls and returns a fixed outcome.
    pub(crate) struct FakeNotifier {
        outcome: bool,
        calls: Arc<AtomicUsize>,
    }

    impl FakeNotifier {
        pub(crate) fn succeeding() -> Self {
            Self {
                outcome: true,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                outcome: false,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn calls(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.calls)
        }
    }

    impl Notifier for FakeNotifier {
        async fn send_digest_notification(&self, _digest: &Digest, _article_count: usize) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
        }
    }
}
