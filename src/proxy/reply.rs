//! Error texts sent to clients.
//!
//! Clients of this protocol family match on these prefixes, so the strings
//! are kept byte-for-byte.

pub const NOAUTH: &str = "NOAUTH Authentication required.";
pub const INVALID_PASSWORD: &str = "ERR invalid password";
pub const SYNTAX_ERROR: &str = "ERR syntax error";
pub const DESTINATION_NOT_SET: &str = "aorta: proxy destination not set";
pub const CACHED_NOT_IMPLEMENTED: &str = "aorta: CACHED is not implemented";

/// Simple-string OK reply.
pub const OK: &[u8] = b"+OK\r\n";

/// Arity error for a proxy-level command.
pub fn wrong_arity(command: &str) -> String {
    format!(
        "ERR wrong number of arguments for '{}' command",
        command.to_ascii_lowercase()
    )
}

/// Prefix a proxy-internal failure.
pub fn internal(detail: impl std::fmt::Display) -> String {
    format!("aorta: {}", detail)
}
