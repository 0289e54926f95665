//! Wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Downstream socket
//!     → conn.rs (buffered read with timeout)
//!     → frame.rs (RESP parse)
//!     → Command { args, raw }           → session dispatch
//!
//! Upstream socket
//!     → conn.rs → frame.rs
//!     → Reply { frame, raw }            → relayed byte-for-byte
//! ```
//!
//! # Design Decisions
//! - Commands and replies keep the exact bytes they arrived as, so forwarding
//!   never re-encodes anything
//! - Every socket read and write carries a deadline

pub mod conn;
pub mod error;
pub mod frame;

pub use conn::RespConn;
pub use error::ConnError;
pub use frame::{encode_command, Frame, FrameError};

use bytes::Bytes;

/// A request read from a client: positional arguments plus the raw frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Bytes>,
    raw: Bytes,
}

impl Command {
    /// Build a command from a decoded frame and the bytes it was decoded from.
    ///
    /// Only non-empty arrays of bulk strings are commands.
    pub fn from_frame(frame: Frame, raw: Bytes) -> Result<Self, ConnError> {
        let items = match frame {
            Frame::Array(items) if !items.is_empty() => items,
            _ => return Err(ConnError::Syntax),
        };
        let args = items
            .into_iter()
            .map(|item| match item {
                Frame::Bulk(data) => Ok(data),
                _ => Err(ConnError::Syntax),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { args, raw })
    }

    /// Build a command from arguments, encoding it for the wire.
    pub fn new<A: AsRef<[u8]>>(args: &[A]) -> Self {
        let raw = encode_command(args);
        let args = args
            .iter()
            .map(|a| Bytes::copy_from_slice(a.as_ref()))
            .collect();
        Self { args, raw }
    }

    /// Upper-cased command keyword.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.args[0]).to_ascii_uppercase()
    }

    /// All tokens, keyword included.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Number of tokens, keyword included.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Token at `index` as UTF-8, if present and valid.
    pub fn arg_str(&self, index: usize) -> Option<&str> {
        self.args
            .get(index)
            .and_then(|a| std::str::from_utf8(a).ok())
    }

    /// The exact bytes this command was received as.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }
}

/// A response read from an upstream server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub frame: Frame,
    pub raw: Bytes,
}

impl Reply {
    pub fn is_error(&self) -> bool {
        matches!(self.frame, Frame::Error(_))
    }
}
