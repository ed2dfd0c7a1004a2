use anyhow::{Context, Result};
use std::env;

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(var) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {}: {}", var, raw)),
        Err(_) => Ok(default),
    }
}

/// Fetch-worker runtime configuration. Environment variables win over the
/// built-in defaults.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub interval_seconds: u64,
    pub jitter_seconds: u64,
    pub max_sources: usize,
    pub log_level: String,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            interval_seconds: env_parse("WORKER_INTERVAL_SECONDS", 300)?,
            jitter_seconds: env_parse("WORKER_JITTER_SECONDS", 60)?,
            max_sources: env_parse("WORKER_MAX_SOURCES", 10)?,
            log_level: env::var("WORKER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Database connection settings. `DATABASE_URL` wins; otherwise the URL is
/// assembled from the individual `DB_*` variables.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        let url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                let host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
                let port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
                let user = env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string());
                let password = env::var("DB_PASSWORD").unwrap_or_default();
                let name = env::var("DB_NAME").unwrap_or_else(|_| "secdigest".to_string());
                format!("postgres://{}:{}@{}:{}/{}", user, password, host, port, name)
            }
        };
        Ok(Self {
            url,
            max_connections: env_parse("DB_POOL_SIZE", 5)?,
        })
    }
}

/// Telegram notifier settings. Missing values leave the notifier disabled
/// rather than failing startup.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub telegram_token: String,
    pub telegram_chat_ids: Vec<i64>,
    pub base_url: String,
}

impl NotifierConfig {
    pub fn from_env() -> Self {
        let telegram_chat_ids = env::var("TELEGRAM_CHAT_IDS")
            .unwrap_or_default()
            .split(',')
            .filter_map(|id| id.trim().parse().ok())
            .collect();
        Self {
            telegram_token: env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            telegram_chat_ids,
            base_url: env::var("DIGEST_BASE_URL")
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_config_defaults() {
        // Only meaningful when the WORKER_* variables are unset, which is the
        // normal test environment.
        if env::var("WORKER_INTERVAL_SECONDS").is_err() {
            let config = WorkerConfig::from_env().unwrap();
            assert_eq!(config.interval_seconds, 300);
            assert_eq!(config.jitter_seconds, 60);
            assert_eq!(config.max_sources, 10);
        }
    }
}
