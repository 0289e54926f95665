//! Client session state machine.
//!
//! # States
//! - Unauthenticated: only AUTH and QUIT are accepted
//! - Authenticated: PROXY binds a destination; other commands report it unset
//! - Bound: commands are forwarded to the bound upstream connection
//!
//! # State Transitions
//! ```text
//! Unauthenticated → Authenticated: AUTH with the proxy password
//! Authenticated → Bound: PROXY host port credential
//! Bound → Authenticated: PROXY with wrong arity (binding cleared)
//! any → Unauthenticated: AUTH with a wrong password
//! any → closed: QUIT, read timeout, peer close, malformed or oversized
//!               frame, proxy shutdown, or any non-AUTH command while
//!               unauthenticated
//! ```
//!
//! Frames from an unauthenticated client are capped far lower than frames
//! from an authenticated one. Shutdown is only observed between commands.
//!
//! # Error Policy
//! - Syntax, arity, routing and relayed upstream errors are answered and the
//!   session continues
//! - Transport errors on the client socket end the session

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;

use crate::config::LimitsConfig;
use crate::net::connection::ConnectionId;
use crate::protocol::{Command, ConnError, RespConn};
use crate::proxy::reply;
use crate::upstream::{ConnectionPool, UpstreamConnection, UpstreamError};

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Bound,
}

/// What the read loop does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// One downstream client connection.
pub struct Session<S> {
    id: ConnectionId,
    conn: RespConn<S>,
    password: Arc<str>,
    pool: Arc<ConnectionPool>,
    limits: LimitsConfig,
    authenticated: bool,
    upstream: Option<Arc<UpstreamConnection>>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        id: ConnectionId,
        stream: S,
        client_timeout: Duration,
        limits: LimitsConfig,
        password: Arc<str>,
        pool: Arc<ConnectionPool>,
    ) -> Self {
        let mut conn = RespConn::new(stream, client_timeout);
        conn.set_frame_limit(Some(limits.unauthenticated_frame_bytes));
        Self {
            id,
            conn,
            password,
            pool,
            limits,
            authenticated: false,
            upstream: None,
        }
    }

    pub fn state(&self) -> SessionState {
        match (self.authenticated, &self.upstream) {
            (false, _) => SessionState::Unauthenticated,
            (true, None) => SessionState::Authenticated,
            (true, Some(_)) => SessionState::Bound,
        }
    }

    /// Process commands until the client leaves, the session must end, or
    /// `shutdown` fires.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::debug!(connection_id = %self.id, "Session started");

        loop {
            let read = tokio::select! {
                read = self.conn.read_command() => read,
                _ = shutdown.recv() => {
                    tracing::debug!(connection_id = %self.id, "Closing session for shutdown");
                    break;
                }
            };

            let command = match read {
                Ok(command) => command,
                Err(e) if e.is_disconnect() => {
                    tracing::debug!(connection_id = %self.id, reason = %e, "Client disconnected");
                    break;
                }
                Err(e @ (ConnError::Syntax | ConnError::Protocol(_))) => {
                    tracing::debug!(connection_id = %self.id, error = %e, "Malformed client frame");
                    let _ = self.conn.write_error(reply::SYNTAX_ERROR).await;
                    break;
                }
                Err(e) => {
                    tracing::debug!(connection_id = %self.id, error = %e, "Client read failed");
                    let _ = self.conn.write_error(&reply::internal(&e)).await;
                    break;
                }
            };

            match self.dispatch(command).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) => break,
                Err(e) => {
                    tracing::debug!(connection_id = %self.id, error = %e, "Client write failed");
                    break;
                }
            }
        }

        let _ = self.conn.shutdown().await;
        tracing::debug!(connection_id = %self.id, "Session ended");
    }

    async fn dispatch(&mut self, command: Command) -> Result<Flow, ConnError> {
        let name = command.name();

        match name.as_str() {
            "QUIT" => return Ok(Flow::Close),
            "AUTH" => {
                self.auth(&command).await?;
                return Ok(Flow::Continue);
            }
            _ => {}
        }

        if !self.authenticated {
            self.conn.write_error(reply::NOAUTH).await?;
            return Ok(Flow::Close);
        }

        if name == "PROXY" {
            self.bind(&command).await?;
            return Ok(Flow::Continue);
        }

        let Some(upstream) = self.upstream.clone() else {
            self.conn.write_error(reply::DESTINATION_NOT_SET).await?;
            return Ok(Flow::Continue);
        };

        if name == "CACHED" {
            self.cached(&command).await?;
        } else {
            self.forward(&upstream, &command).await?;
        }
        Ok(Flow::Continue)
    }

    async fn auth(&mut self, command: &Command) -> Result<(), ConnError> {
        if command.len() != 2 {
            return self.conn.write_error(&reply::wrong_arity("auth")).await;
        }

        if &command.args()[1][..] == self.password.as_bytes() {
            self.authenticated = true;
            self.conn.set_frame_limit(Some(self.limits.max_frame_bytes));
            self.conn.write_raw(reply::OK).await
        } else {
            self.authenticated = false;
            self.conn
                .set_frame_limit(Some(self.limits.unauthenticated_frame_bytes));
            tracing::debug!(connection_id = %self.id, "Client supplied wrong password");
            self.conn.write_error(reply::INVALID_PASSWORD).await
        }
    }

    async fn bind(&mut self, command: &Command) -> Result<(), ConnError> {
        self.upstream = None;

        if command.len() != 4 {
            return self.conn.write_error(&reply::wrong_arity("proxy")).await;
        }

        let (Some(host), Some(port), Some(credential)) =
            (command.arg_str(1), command.arg_str(2), command.arg_str(3))
        else {
            return self.conn.write_error(reply::SYNTAX_ERROR).await;
        };

        let address = join_host_port(host, port);
        let upstream = self.pool.get(&address, credential);
        tracing::debug!(
            connection_id = %self.id,
            upstream = %upstream.address(),
            "Session bound to upstream"
        );
        self.upstream = Some(upstream);
        self.conn.write_raw(reply::OK).await
    }

    /// Result caching is not implemented; validate the TTL and say so.
    async fn cached(&mut self, command: &Command) -> Result<(), ConnError> {
        if command.len() < 3 {
            return self.conn.write_error(&reply::wrong_arity("cached")).await;
        }

        match command.arg_str(1).and_then(|ttl| ttl.parse::<i64>().ok()) {
            Some(ttl) => {
                tracing::debug!(connection_id = %self.id, ttl, "CACHED requested");
                self.conn.write_error(reply::CACHED_NOT_IMPLEMENTED).await
            }
            None => self.conn.write_error(reply::SYNTAX_ERROR).await,
        }
    }

    async fn forward(
        &mut self,
        upstream: &UpstreamConnection,
        command: &Command,
    ) -> Result<(), ConnError> {
        match upstream.do_command(command).await {
            Ok(response) => self.conn.write_raw(&response.raw).await,
            // Error objects are relayed exactly as the upstream sent them.
            Err(UpstreamError::Server(response)) => self.conn.write_raw(&response.raw).await,
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.id,
                    upstream = %upstream.address(),
                    error = %e,
                    redial = e.resets_connection(),
                    "Upstream command failed"
                );
                self.conn.write_error(&e.client_message()).await
            }
        }
    }
}

/// `host:port`, bracketing bare IPv6 hosts.
fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
