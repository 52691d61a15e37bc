//! # stompd-protocol
//!
//! Wire protocol implementation for stompd, a simplified STOMP 1.2 dialect.
//!
//! This crate provides:
//! - NUL-terminated text framing (command, headers, blank line, body)
//! - An incremental decoder that assembles frames from a byte stream
//! - Typed client command parsing with per-command header validation
//! - Server frame constructors (CONNECTED, MESSAGE, RECEIPT, ERROR)

pub mod codec;
pub mod command;
pub mod error;
pub mod frame;

pub use codec::FrameCodec;
pub use command::ClientCommand;
pub use error::ProtocolError;
pub use frame::Frame;

/// STOMP protocol version spoken by this implementation.
pub const STOMP_VERSION: &str = "1.2";

/// Default port for the stompd server.
pub const DEFAULT_PORT: u16 = 7677;

/// Byte terminating every frame on the wire.
pub const FRAME_TERMINATOR: u8 = 0x00;

/// Maximum size of a single frame, terminator included (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;
