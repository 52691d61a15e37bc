//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur during framing or command parsing.
///
/// The `Display` output of these errors is client-visible: the server echoes
/// it in the `message` header of ERROR frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("missing '{0}' header")]
    MissingHeader(&'static str),

    #[error("invalid subscription id: {0}")]
    InvalidSubscriptionId(String),

    #[error("unknown STOMP command: {0}")]
    UnknownCommand(String),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),
}
