//! Upstream connection pool.
//!
//! # Responsibilities
//! - Map each `(address, credential)` identity to exactly one shared connection
//! - Create connections on first request, never dialing from here
//! - Close every pooled socket on shutdown
//! - Close idle sockets on request of the idle sweeper

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::upstream::UpstreamConnection;

/// Identity of an upstream connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpstreamKey {
    pub address: String,
    pub credential: String,
}

/// Singleton-per-key registry of upstream connections.
///
/// This is a cache, not a multi-connection pool: every session bound to the
/// same identity shares one socket.
#[derive(Debug)]
pub struct ConnectionPool {
    connections: DashMap<UpstreamKey, Arc<UpstreamConnection>>,
    server_timeout: Duration,
}

impl ConnectionPool {
    /// Create an empty pool whose connections use `server_timeout` for dialing and I/O.
    pub fn new(server_timeout: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            server_timeout,
        }
    }

    /// Get the shared connection for `(address, credential)`, creating it if absent.
    pub fn get(&self, address: &str, credential: &str) -> Arc<UpstreamConnection> {
        let key = UpstreamKey {
            address: address.to_string(),
            credential: credential.to_string(),
        };

        if let Some(existing) = self.connections.get(&key) {
            return Arc::clone(existing.value());
        }

        // The shard lock is held only for the insert; nothing here does I/O.
        let entry = self.connections.entry(key).or_insert_with(|| {
            tracing::debug!(address = %address, "Creating upstream connection");
            Arc::new(UpstreamConnection::new(address, credential, self.server_timeout))
        });
        Arc::clone(entry.value())
    }

    /// Number of distinct upstream identities.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Close every pooled socket. Entries stay in place and redial on next use.
    pub async fn close_all(&self) -> usize {
        let mut closed = 0;
        for conn in self.snapshot() {
            if conn.close().await {
                closed += 1;
            }
        }
        tracing::info!(closed, "Closed pooled upstream connections");
        closed
    }

    /// Close sockets unused for at least `max_idle`. Returns how many were closed.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut closed = 0;
        for conn in self.snapshot() {
            if conn.close_if_idle(max_idle).await {
                tracing::debug!(address = %conn.address(), "Closed idle upstream connection");
                closed += 1;
            }
        }
        closed
    }

    // Map guards must not be held across an await.
    fn snapshot(&self) -> Vec<Arc<UpstreamConnection>> {
        self.connections
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect()
    }
}
