//! STOMP text frame format.
//!
//! Frame layout on the wire:
//!
//! ```text
//! COMMAND\n
//! name:value\n
//! name:value\n
//! \n
//! body bytes (may contain newlines, never NUL)
//! \0
//! ```
//!
//! The NUL byte is the sole frame delimiter. Header iteration order is
//! insertion order, which is observable to STOMP clients; lookup of a
//! duplicated header name returns the last occurrence.

use crate::error::ProtocolError;
use crate::{FRAME_TERMINATOR, STOMP_VERSION};
use bytes::{BufMut, Bytes, BytesMut};

/// A parsed STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command (e.g. `CONNECT`, `MESSAGE`).
    pub command: String,
    /// Headers in insertion order.
    headers: Vec<(String, String)>,
    /// Frame body, excluding the NUL terminator.
    pub body: Bytes,
}

impl Frame {
    /// Creates a new frame with the given command, no headers and an empty body.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Appends a header. Order is preserved on encode.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the frame body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the value of the last header with the given name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns all headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Encodes the frame into bytes, NUL terminator included.
    pub fn encode(&self) -> BytesMut {
        let mut size = self.command.len() + 2 + self.body.len() + 1;
        for (name, value) in &self.headers {
            size += name.len() + value.len() + 2;
        }
        let mut buf = BytesMut::with_capacity(size);

        buf.put_slice(self.command.as_bytes());
        buf.put_u8(b'\n');
        for (name, value) in &self.headers {
            buf.put_slice(name.as_bytes());
            buf.put_u8(b':');
            buf.put_slice(value.as_bytes());
            buf.put_u8(b'\n');
        }
        buf.put_u8(b'\n');
        buf.put_slice(&self.body);
        buf.put_u8(FRAME_TERMINATOR);
        buf
    }

    /// Parses a frame from its wire content, NUL terminator excluded.
    ///
    /// Header values are everything after the first colon, trimmed. The body
    /// is kept verbatim, newlines included.
    pub fn parse(content: &[u8]) -> Result<Self, ProtocolError> {
        let (command_line, rest) = split_line(content);
        let command = std::str::from_utf8(command_line)
            .map_err(|_| ProtocolError::MalformedFrame("command line is not UTF-8".to_string()))?
            .trim()
            .to_string();
        if command.is_empty() {
            return Err(ProtocolError::MalformedFrame(
                "empty command line".to_string(),
            ));
        }

        let mut headers = Vec::new();
        let mut remaining = rest;
        let body = loop {
            let Some(cursor) = remaining else {
                // Frame ended without a blank line; tolerated as an empty body.
                break Bytes::new();
            };
            let (line, rest) = split_line(cursor);
            if line.is_empty() || line == b"\r" {
                break Bytes::copy_from_slice(rest.unwrap_or(b""));
            }
            let line = std::str::from_utf8(line).map_err(|_| {
                ProtocolError::MalformedFrame("header line is not UTF-8".to_string())
            })?;
            let Some((name, value)) = line.split_once(':') else {
                return Err(ProtocolError::MalformedFrame(format!(
                    "header line without colon: {line:?}"
                )));
            };
            headers.push((name.trim().to_string(), value.trim().to_string()));
            remaining = rest;
        };

        Ok(Self {
            command,
            headers,
            body,
        })
    }

    // --- Server frame constructors ---

    /// Builds a CONNECTED frame with the negotiated version and session id.
    pub fn connected(session_id: &str) -> Self {
        Self::new("CONNECTED")
            .with_header("version", STOMP_VERSION)
            .with_header("session", session_id)
    }

    /// Builds a MESSAGE frame for one subscriber of a broadcast.
    pub fn message(subscription_id: u64, message_id: u64, destination: &str, body: Bytes) -> Self {
        Self::new("MESSAGE")
            .with_header("subscription", subscription_id.to_string())
            .with_header("message-id", message_id.to_string())
            .with_header("destination", destination)
            .with_body(body)
    }

    /// Builds a RECEIPT frame acknowledging the given receipt id.
    pub fn receipt(receipt_id: &str) -> Self {
        Self::new("RECEIPT").with_header("receipt-id", receipt_id)
    }

    /// Builds an ERROR frame.
    ///
    /// If `receipt_id` is set, the offending frame carried a `receipt` header
    /// and its id is echoed back. `detail` becomes the free-text body.
    pub fn error(message: &str, receipt_id: Option<&str>, detail: Option<&str>) -> Self {
        let mut frame = Self::new("ERROR").with_header("message", message);
        if let Some(id) = receipt_id {
            frame = frame.with_header("receipt-id", id);
        }
        if let Some(detail) = detail {
            frame = frame.with_body(Bytes::copy_from_slice(detail.as_bytes()));
        }
        frame
    }
}

/// Splits off the first `\n`-terminated line.
///
/// Returns the line (without the newline) and the remainder, or `None` for
/// the remainder when no newline is present.
fn split_line(content: &[u8]) -> (&[u8], Option<&[u8]>) {
    match content.iter().position(|&b| b == b'\n') {
        Some(pos) => (&content[..pos], Some(&content[pos + 1..])),
        None => (content, None),
    }
}
