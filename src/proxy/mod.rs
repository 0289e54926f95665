//! Proxy subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection
//!     → server.rs (spawn one task per client)
//!     → session.rs (read command, run state machine)
//!         AUTH / QUIT / PROXY / CACHED → answered locally
//!         anything else                → bound upstream connection
//!     → reply.rs texts for every locally generated error
//! ```

pub mod reply;
pub mod server;
pub mod session;

pub use server::ProxyServer;
pub use session::{Session, SessionState};
