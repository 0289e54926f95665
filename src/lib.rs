//! Authenticating, multiplexing proxy for the Redis wire protocol.
//!
//! Clients authenticate against the proxy's own password, pick a destination
//! with `PROXY host port credential`, and then talk to that upstream as if
//! directly connected. Every session bound to the same
//! `(address, credential)` shares one long-lived upstream socket.

// Core subsystems
pub mod config;
pub mod net;
pub mod protocol;
pub mod proxy;
pub mod upstream;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use lifecycle::Shutdown;
pub use proxy::ProxyServer;
pub use upstream::ConnectionPool;
