//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!       (connection_id, peer_addr, upstream address)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//! ```

pub mod logging;
