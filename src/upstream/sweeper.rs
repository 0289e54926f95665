//! Idle upstream eviction.
//!
//! # Responsibilities
//! - Periodically close upstream sockets that have sat unused past a threshold
//! - Leave pool entries in place so the lazy redial path recovers on next use

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::config::UpstreamConfig;
use crate::upstream::ConnectionPool;

pub struct IdleSweeper {
    pool: Arc<ConnectionPool>,
    max_idle: Duration,
    interval: Duration,
}

impl IdleSweeper {
    /// Build a sweeper from config. Returns `None` when eviction is disabled.
    pub fn from_config(pool: Arc<ConnectionPool>, config: &UpstreamConfig) -> Option<Self> {
        if config.idle_timeout_secs == 0 {
            return None;
        }
        Some(Self::new(
            pool,
            Duration::from_secs(config.idle_timeout_secs),
            Duration::from_secs(config.sweep_interval_secs),
        ))
    }

    pub fn new(pool: Arc<ConnectionPool>, max_idle: Duration, interval: Duration) -> Self {
        Self {
            pool,
            max_idle,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            max_idle_secs = self.max_idle.as_secs(),
            interval_secs = self.interval.as_secs(),
            "Idle sweeper starting"
        );

        let mut ticker = time::interval(self.interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let closed = self.pool.sweep_idle(self.max_idle).await;
                    if closed > 0 {
                        tracing::info!(closed, "Closed idle upstream connections");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Idle sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
