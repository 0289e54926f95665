//! Proxy server: accept loop and shutdown.
//!
//! # Responsibilities
//! - Accept client connections through the bounded listener
//! - Spawn one session task per connection
//! - Run the idle sweeper when eviction is enabled
//! - On shutdown: stop accepting, tell sessions to stop between commands,
//!   drain them, close pooled upstream sockets

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::ProxyConfig;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::proxy::Session;
use crate::upstream::{ConnectionPool, IdleSweeper};

/// Delay before retrying after a failed accept (e.g. fd exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct ProxyServer {
    config: ProxyConfig,
    pool: Arc<ConnectionPool>,
    tracker: ConnectionTracker,
}

impl ProxyServer {
    /// Create a server around a pool that outlives it.
    pub fn new(config: ProxyConfig, pool: Arc<ConnectionPool>) -> Self {
        Self {
            config,
            pool,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Serve until `shutdown` fires.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Proxy server starting");
        }

        if let Some(sweeper) = IdleSweeper::from_config(self.pool.clone(), &self.config.upstream) {
            tokio::spawn(sweeper.run(shutdown.resubscribe()));
        }

        let password: Arc<str> = Arc::from(self.config.auth.password.as_str());
        let client_timeout = self.config.timeouts.client_idle();
        let limits = self.config.limits;

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::Accept(e)) => {
                            tracing::warn!(error = %e, "Accept failed");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                        Err(e) => return Err(e),
                    };
                    let _ = stream.set_nodelay(true);

                    let guard = self.tracker.track();
                    tracing::debug!(connection_id = %guard.id(), peer_addr = %peer, "Session accepted");

                    let session = Session::new(
                        guard.id(),
                        stream,
                        client_timeout,
                        limits,
                        password.clone(),
                        self.pool.clone(),
                    );
                    let stop = shutdown.resubscribe();
                    tokio::spawn(async move {
                        session.run(stop).await;
                        drop(guard);
                        drop(permit);
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!("Proxy server received shutdown signal, no longer accepting");
                    break;
                }
            }
        }
        drop(listener);

        let drain = Duration::from_secs(self.config.shutdown.drain_secs);
        if !self.tracker.wait_idle(drain).await {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain deadline passed with sessions still open"
            );
        }

        self.pool.close_all().await;
        tracing::info!("Proxy server stopped");
        Ok(())
    }
}
