//! stompd - Simplified STOMP 1.2 message broker
//!
//! A TCP broker with channel pub/sub, selectable accept strategy, and an
//! in-process credential directory.

use clap::Parser;
use std::net::IpAddr;
use std::sync::Arc;
use stompd_server::{Config, InMemoryDirectory, Server, Strategy};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stompd", version, about = "Simplified STOMP 1.2 message broker")]
struct Cli {
    /// Port to listen on
    port: u16,

    /// Accept strategy: "blocking" (thread per connection) or "reactor"
    /// (worker pool)
    strategy: Strategy,

    /// Address to bind (overrides the configured bind address)
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Worker threads for the reactor strategy
    #[arg(long)]
    workers: Option<usize>,

    /// Maximum concurrent connections
    #[arg(long)]
    max_connections: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration (from file if STOMPD_CONFIG is set, then env
    // overrides), then apply CLI arguments on top
    let mut config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("STOMPD_CONFIG") {
                tracing::info!("Loaded config from {path}");
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if std::env::var("STOMPD_CONFIG").is_ok() {
                tracing::error!("Failed to load config: {e}");
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    config.strategy = cli.strategy;
    config.network.bind_addr.set_port(cli.port);
    if let Some(ip) = cli.bind {
        config.network.bind_addr.set_ip(ip);
    }
    if let Some(workers) = cli.workers {
        config.network.workers = workers;
    }
    if let Some(max) = cli.max_connections {
        config.network.max_connections = max;
    }

    tracing::info!("Starting stompd");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Strategy: {}", config.strategy);
    if config.strategy == Strategy::Reactor {
        tracing::info!("  Workers: {}", config.network.workers);
    }

    let directory = Arc::new(InMemoryDirectory::new());
    let server = Server::bind(config, directory)?;
    server.run()?;
    Ok(())
}
