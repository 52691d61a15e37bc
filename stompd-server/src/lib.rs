//! # stompd-server
//!
//! STOMP broker server for stompd.
//!
//! This crate provides:
//! - The shared connection registry / publish-subscribe broker
//! - The per-connection protocol state machine
//! - A connection driver feeding decoded frames into the state machine
//! - Two interchangeable accept strategies: thread-per-connection blocking
//!   I/O, and a tokio reactor with a fixed worker pool
//! - The injected credential/audit collaborator boundary

pub mod blocking;
pub mod broker;
pub mod config;
pub mod connection;
pub mod directory;
pub mod error;
pub mod reactor;
pub mod server;
pub mod session;

pub use broker::{Broker, ConnectionId, SendHandle, SubscriptionId};
pub use config::{Config, ConfigError, Strategy};
pub use connection::Connection;
pub use directory::{Directory, InMemoryDirectory, LoginStatus};
pub use error::ServerError;
pub use server::Server;
pub use session::{SessionState, StompSession};
