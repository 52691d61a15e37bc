//! Per-connection driver.
//!
//! A `Connection` owns one codec/state-machine pair and is fed raw transport
//! bytes by whichever server strategy scheduled it. It is transport-agnostic:
//! the blocking and reactor strategies both drive it the same way, differing
//! only in when [`feed`](Connection::feed) gets to run.

use crate::broker::{Broker, ConnectionId};
use crate::config::SessionConfig;
use crate::directory::Directory;
use crate::session::StompSession;
use std::sync::Arc;
use stompd_protocol::FrameCodec;

/// Whether the connection should keep reading after a `feed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    Continue,
    /// The session terminated; the transport should be closed.
    Closed,
}

/// Codec + state machine for one live transport connection.
pub struct Connection {
    connection_id: ConnectionId,
    codec: FrameCodec,
    session: StompSession,
    broker: Arc<Broker>,
    directory: Arc<dyn Directory>,
    finished: bool,
}

impl Connection {
    pub fn new(
        connection_id: ConnectionId,
        broker: Arc<Broker>,
        directory: Arc<dyn Directory>,
        config: SessionConfig,
    ) -> Self {
        let session = StompSession::new(connection_id, broker.clone(), directory.clone(), config);
        Self {
            connection_id,
            codec: FrameCodec::new(),
            session,
            broker,
            directory,
            finished: false,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Feeds a chunk of transport bytes, dispatching every completed frame
    /// to the state machine.
    pub fn feed(&mut self, bytes: &[u8]) -> FeedOutcome {
        self.codec.extend(bytes);
        loop {
            match self.codec.decode_frame() {
                Ok(Some(frame)) => {
                    tracing::trace!(
                        connection = self.connection_id,
                        command = frame.command.as_str(),
                        "frame received"
                    );
                    self.session.process_frame(&frame);
                }
                Ok(None) => break,
                Err(e) => {
                    self.session.on_malformed(&e);
                    break;
                }
            }
            if self.session.is_terminated() {
                break;
            }
        }
        if self.session.is_terminated() {
            FeedOutcome::Closed
        } else {
            FeedOutcome::Continue
        }
    }

    /// Tears the connection down: broker disconnect plus directory logout.
    ///
    /// Called on every exit path of a handler loop so the registry never
    /// retains a stale handle. Idempotent; the DISCONNECT command path has
    /// usually done both already.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.broker.disconnect(self.connection_id);
        self.directory.logout(self.connection_id);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.finish();
    }
}
