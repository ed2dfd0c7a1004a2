use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

/// Cooperative shutdown flag shared between the signal handler and the
/// worker loops. Sleeps poll it at least once per second.
#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early when the flag is set.
    pub async fn sleep(&self, duration: Duration) {
        let deadline = tokio::time::Instant::now() + duration;
        while !self.is_set() {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            let chunk = (deadline - now).min(Duration::from_secs(1));
            tokio::time::sleep(chunk).await;
        }
    }

    /// Set the flag on SIGINT or SIGTERM.
    pub fn install_signal_handlers(&self) -> Result<()> {
        let mut sigterm =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        let flag = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("received SIGINT, shutting down gracefully");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down gracefully");
                }
            }
            flag.set();
        });
        Ok(())
    }
}
