//! Server core shared by both accept strategies.
//!
//! A [`Server`] binds its listener eagerly so callers can learn the bound
//! address (tests bind port 0), then [`run`](Server::run) hands the listener
//! to the configured strategy. Both strategies share one broker and one
//! directory and construct codec/session pairs identically; only how a
//! connection's handler gets scheduled differs.

use crate::broker::{Broker, ConnectionId};
use crate::config::{Config, Strategy};
use crate::connection::Connection;
use crate::directory::Directory;
use crate::error::ServerError;
use crate::{blocking, reactor};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    connections_total: AtomicU64,
    connections_active: AtomicU64,
}

impl ServerStats {
    pub(crate) fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connections_total(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }

    pub fn connections_active(&self) -> u64 {
        self.connections_active.load(Ordering::Relaxed)
    }
}

/// STOMP broker server.
pub struct Server {
    config: Config,
    listener: std::net::TcpListener,
    local_addr: SocketAddr,
    broker: Arc<Broker>,
    directory: Arc<dyn Directory>,
    stats: Arc<ServerStats>,
    next_connection_id: AtomicU64,
}

impl Server {
    /// Binds the listener for the configured address.
    ///
    /// The accept loop does not start until [`run`](Server::run).
    pub fn bind(config: Config, directory: Arc<dyn Directory>) -> Result<Self, ServerError> {
        let listener = std::net::TcpListener::bind(config.network.bind_addr)?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            config,
            listener,
            local_addr,
            broker: Arc::new(Broker::new()),
            directory,
            stats: Arc::new(ServerStats::default()),
            next_connection_id: AtomicU64::new(0),
        })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the accept loop with the configured strategy.
    ///
    /// The loop survives any single connection's failure; it only returns on
    /// a listener-level fault or (reactor strategy) a shutdown signal.
    pub fn run(&self) -> Result<(), ServerError> {
        tracing::info!(
            addr = %self.local_addr,
            strategy = %self.config.strategy,
            "server listening"
        );
        match self.config.strategy {
            Strategy::Blocking => blocking::serve(self),
            Strategy::Reactor => reactor::serve(self),
        }
    }

    pub(crate) fn listener(&self) -> &std::net::TcpListener {
        &self.listener
    }

    /// Allocates a fresh connection id, never reused for the process lifetime.
    pub(crate) fn allocate_connection_id(&self) -> ConnectionId {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Builds the codec/state-machine pair for an accepted connection. The
    /// caller must have registered the connection's send handle with the
    /// broker first.
    pub(crate) fn new_connection(&self, id: ConnectionId) -> Connection {
        Connection::new(
            id,
            self.broker.clone(),
            self.directory.clone(),
            self.config.session.clone(),
        )
    }

    pub(crate) fn at_capacity(&self) -> bool {
        self.stats.connections_active() >= self.config.network.max_connections as u64
    }
}
