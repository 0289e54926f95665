//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Client-facing authentication.
    pub auth: AuthConfig,

    /// Client frame size limits.
    pub limits: LimitsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Upstream connection housekeeping.
    pub upstream: UpstreamConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:6380").
    pub bind_address: String,

    /// Maximum concurrent client sessions (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:6380".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Client frame size limits.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest frame accepted from an authenticated client, in bytes.
    pub max_frame_bytes: usize,

    /// Largest frame accepted before AUTH succeeds, in bytes.
    pub unauthenticated_frame_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 1024 * 1024 * 1024,    // 1GiB
            unauthenticated_frame_bytes: 64 * 1024, // 64KiB
        }
    }
}

/// Client authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Password clients must present with AUTH. Independent of upstream credentials.
    pub password: String,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long a client may sit idle between commands, in seconds.
    pub client_idle_secs: u64,

    /// Upstream dial and per-read/write deadline, in seconds.
    pub server_secs: u64,
}

impl TimeoutConfig {
    pub fn client_idle(&self) -> Duration {
        Duration::from_secs(self.client_idle_secs)
    }

    pub fn server(&self) -> Duration {
        Duration::from_secs(self.server_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            client_idle_secs: 300,
            server_secs: 5,
        }
    }
}

/// Upstream connection housekeeping.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Close upstream sockets idle this long, in seconds. 0 disables eviction.
    pub idle_timeout_secs: u64,

    /// How often the idle sweeper runs, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 0,
            sweep_interval_secs: 30,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for open sessions to finish, in seconds.
    pub drain_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { drain_secs: 10 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
