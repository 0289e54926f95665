//! A single shared connection to one upstream server.
//!
//! # Responsibilities
//! - Dial lazily on first use, authenticating with the upstream credential
//! - Serialize every command through one socket (one in flight at a time)
//! - Drop the socket on any I/O failure so the next command redials
//! - Track last use for idle eviction
//!
//! # Design Decisions
//! - The socket lives behind an async mutex held for the whole
//!   write-then-read exchange; the protocol has no request ids, so
//!   interleaving two commands would hand each caller the other's reply
//! - The socket is taken out of the lock state for the exchange and only
//!   put back on success, which makes "invalidate on error" the default

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time;

use crate::protocol::{Command, ConnError, Reply, RespConn};
use crate::upstream::UpstreamError;

struct Inner {
    conn: Option<RespConn<TcpStream>>,
    last_used: Instant,
    /// Replies still owed for commands issued with `send`.
    pending: usize,
}

/// Connection to one `(address, credential)` upstream identity.
pub struct UpstreamConnection {
    address: String,
    credential: String,
    timeout: Duration,
    dials: AtomicU64,
    inner: Mutex<Inner>,
}

impl UpstreamConnection {
    /// Create an unconnected handle. No I/O happens until the first command.
    pub fn new(address: impl Into<String>, credential: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            credential: credential.into(),
            timeout,
            dials: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                conn: None,
                last_used: Instant::now(),
                pending: 0,
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    /// Number of sockets opened over this connection's lifetime.
    pub fn dial_count(&self) -> u64 {
        self.dials.load(Ordering::Relaxed)
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.conn.is_some()
    }

    /// Run one command and wait for its reply.
    ///
    /// An error object from the upstream comes back as `UpstreamError::Server`
    /// and leaves the socket in place.
    pub async fn do_command(&self, command: &Command) -> Result<Reply, UpstreamError> {
        let mut inner = self.inner.lock().await;
        inner.last_used = Instant::now();

        let mut conn = match inner.conn.take() {
            Some(conn) => conn,
            None => {
                inner.pending = 0;
                self.dial().await?
            }
        };

        match exchange(&mut conn, inner.pending, command).await {
            Ok(reply) => {
                inner.pending = 0;
                inner.conn = Some(conn);
                if reply.is_error() {
                    Err(UpstreamError::Server(reply))
                } else {
                    Ok(reply)
                }
            }
            Err(e) => {
                tracing::debug!(
                    address = %self.address,
                    error = %e,
                    "Upstream socket failed, dropping it"
                );
                Err(e.into())
            }
        }
    }

    /// Write a command without waiting for its reply.
    ///
    /// The reply is read and discarded before the next `do_command`.
    pub async fn send(&self, command: &Command) -> Result<(), UpstreamError> {
        let mut inner = self.inner.lock().await;
        inner.last_used = Instant::now();

        let mut conn = match inner.conn.take() {
            Some(conn) => conn,
            None => {
                inner.pending = 0;
                self.dial().await?
            }
        };

        match conn.write_raw(command.raw()).await {
            Ok(()) => {
                inner.pending += 1;
                inner.conn = Some(conn);
                Ok(())
            }
            Err(e) => {
                tracing::debug!(
                    address = %self.address,
                    error = %e,
                    "Upstream socket failed, dropping it"
                );
                Err(e.into())
            }
        }
    }

    /// Close the socket if one is open. The next command redials.
    pub async fn close(&self) -> bool {
        let mut inner = self.inner.lock().await;
        Self::close_inner(&mut inner).await
    }

    /// Close the socket if it has not been used for `max_idle`.
    ///
    /// Skips connections that are busy right now.
    pub async fn close_if_idle(&self, max_idle: Duration) -> bool {
        let Ok(mut inner) = self.inner.try_lock() else {
            return false;
        };
        if inner.conn.is_none() || inner.last_used.elapsed() < max_idle {
            return false;
        }
        Self::close_inner(&mut inner).await
    }

    async fn close_inner(inner: &mut Inner) -> bool {
        inner.pending = 0;
        match inner.conn.take() {
            Some(mut conn) => {
                let _ = conn.shutdown().await;
                true
            }
            None => false,
        }
    }

    async fn dial(&self) -> Result<RespConn<TcpStream>, UpstreamError> {
        self.dials.fetch_add(1, Ordering::Relaxed);

        let stream = match time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(UpstreamError::Dial {
                    address: self.address.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(UpstreamError::DialTimeout {
                    address: self.address.clone(),
                })
            }
        };
        let _ = stream.set_nodelay(true);
        let mut conn = RespConn::new(stream, self.timeout);

        if !self.credential.is_empty() {
            let auth = Command::new(&["AUTH", self.credential.as_str()]);
            conn.write_raw(auth.raw()).await?;
            let reply = conn.read_reply().await?;
            if let Some(message) = reply.frame.error_message() {
                let _ = conn.shutdown().await;
                return Err(UpstreamError::AuthRejected {
                    address: self.address.clone(),
                    message: message.to_string(),
                });
            }
        }

        tracing::debug!(address = %self.address, "Upstream connected");
        Ok(conn)
    }
}

/// Drain owed replies, then write `command` and read its reply.
async fn exchange(
    conn: &mut RespConn<TcpStream>,
    pending: usize,
    command: &Command,
) -> Result<Reply, ConnError> {
    for _ in 0..pending {
        conn.read_reply().await?;
    }
    conn.write_raw(command.raw()).await?;
    conn.read_reply().await
}

impl fmt::Debug for UpstreamConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConnection")
            .field("address", &self.address)
            .field("dials", &self.dial_count())
            .finish_non_exhaustive()
    }
}
