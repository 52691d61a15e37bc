//! Client error types.

use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] stompd_protocol::ProtocolError),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("server rejected the request: {0}")]
    Rejected(String),
}
