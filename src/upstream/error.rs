//! Upstream error type.

use thiserror::Error;

use crate::protocol::{ConnError, Reply};

/// Errors returned by an upstream command.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// TCP connect failed.
    #[error("dial tcp {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// TCP connect did not finish before the server timeout.
    #[error("dial tcp {address}: i/o timeout")]
    DialTimeout { address: String },

    /// The upstream refused the configured credential.
    #[error("upstream {address} rejected authentication: {message}")]
    AuthRejected { address: String, message: String },

    /// The socket failed while writing the command or reading the reply.
    #[error(transparent)]
    Io(#[from] ConnError),

    /// The upstream answered with an error object.
    #[error("{}", .0.frame.error_message().unwrap_or_default())]
    Server(Reply),
}

impl UpstreamError {
    /// Text relayed to the client as an error reply.
    pub fn client_message(&self) -> String {
        match self {
            UpstreamError::Server(_) => self.to_string(),
            other => format!("aorta: {}", other),
        }
    }

    /// True when the socket was dropped and the next command redials.
    pub fn resets_connection(&self) -> bool {
        !matches!(self, UpstreamError::Server(_))
    }
}
