//! Server error types.

use thiserror::Error;

/// Server errors.
///
/// Protocol violations never surface here: they are answered with ERROR
/// frames and end the offending session. This type covers faults of the
/// server process itself.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}
