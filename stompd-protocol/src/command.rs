//! Typed client commands.
//!
//! Client frames are lowered into a [`ClientCommand`] before the session
//! state machine sees them, so every command's required headers are checked
//! in one place and an unhandled command is a compile-time omission in the
//! session's `match`, not a silent runtime fallback.

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::STOMP_VERSION;
use bytes::Bytes;

/// A validated client-to-server command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// CONNECT with credentials. `accept-version` has already been checked
    /// to contain the supported version.
    Connect { login: String, passcode: String },
    /// SEND a body to a destination channel. `file_name` carries the
    /// optional `file name` header reported to the audit log.
    Send {
        destination: String,
        body: Bytes,
        file_name: Option<String>,
    },
    /// SUBSCRIBE to a destination under a client-chosen subscription id.
    Subscribe { destination: String, id: u64 },
    /// UNSUBSCRIBE a previously registered subscription id.
    Unsubscribe { id: u64 },
    /// DISCONNECT the session.
    Disconnect,
}

impl ClientCommand {
    /// Validates a parsed frame into a typed command.
    ///
    /// The `receipt` header is deliberately not part of the command: the
    /// session reads it off the frame so it can be echoed even when this
    /// validation fails.
    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        match frame.command.as_str() {
            "CONNECT" => {
                let login = required(frame, "login")?;
                let passcode = required(frame, "passcode")?;
                let version = required(frame, "accept-version")?;
                if !version.split(',').any(|v| v.trim() == STOMP_VERSION) {
                    return Err(ProtocolError::UnsupportedVersion(version));
                }
                Ok(Self::Connect { login, passcode })
            }
            "SEND" => Ok(Self::Send {
                destination: required(frame, "destination")?,
                body: frame.body.clone(),
                file_name: frame.header("file name").map(str::to_string),
            }),
            "SUBSCRIBE" => Ok(Self::Subscribe {
                destination: required(frame, "destination")?,
                id: subscription_id(frame)?,
            }),
            "UNSUBSCRIBE" => Ok(Self::Unsubscribe {
                id: subscription_id(frame)?,
            }),
            "DISCONNECT" => Ok(Self::Disconnect),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

fn required(frame: &Frame, name: &'static str) -> Result<String, ProtocolError> {
    frame
        .header(name)
        .map(str::to_string)
        .ok_or(ProtocolError::MissingHeader(name))
}

fn subscription_id(frame: &Frame) -> Result<u64, ProtocolError> {
    let raw = required(frame, "id")?;
    raw.parse()
        .map_err(|_| ProtocolError::InvalidSubscriptionId(raw))
}
