//! aorta: a transparent Redis protocol proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌───────────────────────────────────────────────┐
//!                  │                     AORTA                     │
//!   Client         │  ┌──────────┐    ┌───────────┐                │
//!   ───────────────┼─▶│ listener │───▶│  session  │── AUTH/PROXY/  │
//!                  │  └──────────┘    │  (task)   │   CACHED/QUIT  │
//!                  │                  └─────┬─────┘   handled here │
//!                  │                        │ forwarded commands   │
//!                  │                        ▼                      │
//!                  │              ┌──────────────────┐             │
//!                  │              │ connection pool  │             │
//!                  │              │ (address, cred)  │             │
//!                  │              └────────┬─────────┘             │
//!                  │                       ▼                       │
//!                  │              ┌──────────────────┐             │   Upstream
//!                  │              │ upstream conn    │─────────────┼──▶ server
//!                  │              │ (one socket)     │             │
//!                  │              └──────────────────┘             │
//!                  └───────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use aorta::config::loader::{read_config, ConfigError};
use aorta::config::validation::validate_config;
use aorta::config::ProxyConfig;
use aorta::lifecycle::{signals, Shutdown};
use aorta::net::listener::Listener;
use aorta::observability::logging;
use aorta::{ConnectionPool, ProxyServer};

#[derive(Parser)]
#[command(name = "aorta")]
#[command(about = "Authenticating proxy for the Redis wire protocol", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Password clients must AUTH with (overrides config)
    #[arg(short, long)]
    password: Option<String>,

    /// Client idle timeout in seconds (overrides config)
    #[arg(long)]
    client_timeout: Option<u64>,

    /// Upstream dial and I/O timeout in seconds (overrides config)
    #[arg(long)]
    server_timeout: Option<u64>,
}

impl Cli {
    fn load(&self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => ProxyConfig::default(),
        };

        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(password) = &self.password {
            config.auth.password = password.clone();
        }
        if let Some(secs) = self.client_timeout {
            config.timeouts.client_idle_secs = secs;
        }
        if let Some(secs) = self.server_timeout {
            config.timeouts.server_secs = secs;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    logging::init_logging(&config.observability)?;

    tracing::info!("aorta v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        client_idle_secs = config.timeouts.client_idle_secs,
        server_secs = config.timeouts.server_secs,
        idle_eviction_secs = config.upstream.idle_timeout_secs,
        "Configuration loaded"
    );

    let pool = Arc::new(ConnectionPool::new(config.timeouts.server()));
    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    let server = ProxyServer::new(config, pool);
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        signal = signals::wait_for_signal() => {
            tracing::info!(signal, "Shutdown requested");
            shutdown.trigger();
            server_task.await??;
        }
        result = &mut server_task => {
            result??;
        }
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
