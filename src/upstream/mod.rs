//! Upstream subsystem.
//!
//! # Data Flow
//! ```text
//! PROXY host port credential
//!     → pool.rs (get or create the connection for (host:port, credential))
//!     → session keeps the Arc as its binding
//!
//! Forwarded command
//!     → connection.rs (lock, dial + AUTH if needed, write, read one reply)
//!     → Reply or UpstreamError back to the session
//!
//! Background
//!     → sweeper.rs (close sockets idle past the threshold)
//! ```
//!
//! # Design Decisions
//! - One socket per upstream identity, shared by every session bound to it
//! - Pool lock and per-connection lock are distinct; only same-identity
//!   traffic is serialized
//! - Recovery is lazy: failed sockets are dropped and redialed on next use

pub mod connection;
pub mod error;
pub mod pool;
pub mod sweeper;

pub use connection::UpstreamConnection;
pub use error::UpstreamError;
pub use pool::{ConnectionPool, UpstreamKey};
pub use sweeper::IdleSweeper;
