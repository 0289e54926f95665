//! Connection-level error type.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while reading or writing frames on a socket.
#[derive(Debug, Error)]
pub enum ConnError {
    /// No data arrived (or could be written) before the deadline.
    #[error("i/o timeout after {0:?}")]
    Timeout(Duration),

    /// The peer closed the connection between frames.
    #[error("connection closed")]
    Closed,

    /// A well-formed frame that is not a valid command.
    #[error("syntax error")]
    Syntax,

    /// Bytes that are not valid RESP.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConnError {
    /// True when the error means the client simply went away or idled out.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ConnError::Timeout(_) | ConnError::Closed)
    }
}
