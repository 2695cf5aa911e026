//! Concurrent caching forward proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                  FORWARD PROXY                   │
//!                        │                                                  │
//!   GET http://host/path │  ┌──────────┐   ┌──────────┐   ┌─────────────┐   │
//!   ─────────────────────┼─▶│   net    │──▶│  http    │──▶│   request   │   │
//!                        │  │ listener │   │ server   │   │   parser    │   │
//!                        │  └──────────┘   └──────────┘   └──────┬──────┘   │
//!                        │                                       ▼          │
//!                        │                 ┌──────────┐   ┌─────────────┐   │
//!                        │                 │  object  │◀─▶│   session   │   │
//!                        │                 │  cache   │   │   handler   │   │
//!                        │                 └──────────┘   └──────┬──────┘   │
//!                        │                                       ▼ miss     │
//!   response bytes       │                                ┌─────────────┐   │
//!   ◀────────────────────┼────────────────────────────────│   forward   │◀──┼── Origin
//!                        │                                └─────────────┘   │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use forward_proxy::config::{load_config, validate_config, ConfigError, ProxyConfig};
use forward_proxy::lifecycle::startup;
use forward_proxy::observability::logging;

/// Concurrent HTTP forward proxy with an in-memory LRU cache
#[derive(Parser, Debug)]
#[command(name = "forward-proxy", version, about, long_about = None)]
struct Cli {
    /// Port to listen on (overrides the port in the bind address)
    port: Option<u16>,

    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, e.g. 127.0.0.1:15213
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Apply command-line overrides on top of the file configuration.
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            if let Ok(mut addr) = config.listener.bind_address.parse::<SocketAddr>() {
                addr.set_port(port);
                config.listener.bind_address = addr.to_string();
            }
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability)?;

    tracing::info!("forward-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        cache_enabled = config.cache.enabled,
        cache_capacity_bytes = config.cache.capacity_bytes,
        max_object_bytes = config.cache.max_object_bytes,
        "Configuration loaded"
    );

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
