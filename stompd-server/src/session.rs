//! Per-connection protocol state machine.
//!
//! One `StompSession` is created per accepted connection and consumes the
//! frames its codec produces. It owns the session's private view of its
//! subscriptions and talks to the shared [`Broker`] for routing and to the
//! injected [`Directory`] for credentials and audit events.
//!
//! Protocol violations have no soft path: every ERROR frame is paired with
//! terminating the session and disconnecting it from the broker. The one
//! configurable exception is a SEND to an unsubscribed destination, see
//! [`SessionConfig`].

use crate::broker::{Broker, ConnectionId, SubscriptionId};
use crate::config::SessionConfig;
use crate::directory::{Directory, LoginStatus};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use stompd_protocol::{ClientCommand, Frame, ProtocolError};

/// Session lifecycle state. `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Terminated,
}

/// Protocol state machine for one connection.
pub struct StompSession {
    connection_id: ConnectionId,
    state: SessionState,
    username: Option<String>,
    /// This session's own subscriptions: subscription id -> channel.
    subscriptions: HashMap<SubscriptionId, String>,
    broker: Arc<Broker>,
    directory: Arc<dyn Directory>,
    config: SessionConfig,
}

impl StompSession {
    pub fn new(
        connection_id: ConnectionId,
        broker: Arc<Broker>,
        directory: Arc<dyn Directory>,
        config: SessionConfig,
    ) -> Self {
        Self {
            connection_id,
            state: SessionState::Unauthenticated,
            username: None,
            subscriptions: HashMap::new(),
            broker,
            directory,
            config,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Terminated
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Processes one decoded frame. Frames arriving after termination are
    /// ignored; the owning handler is expected to close the transport.
    pub fn process_frame(&mut self, frame: &Frame) {
        if self.is_terminated() {
            return;
        }

        let receipt = frame.header("receipt").map(str::to_string);
        match ClientCommand::from_frame(frame) {
            Ok(command) => self.dispatch(command, receipt.as_deref()),
            Err(e) => {
                tracing::debug!(connection = self.connection_id, error = %e, "rejecting frame");
                self.error_and_terminate(&e.to_string(), receipt.as_deref(), None);
            }
        }
    }

    /// Reports a codec-level malformation. Same terminal handling as any
    /// other protocol violation; the offending bytes never formed a frame,
    /// so there is no receipt to echo.
    pub fn on_malformed(&mut self, error: &ProtocolError) {
        if self.is_terminated() {
            return;
        }
        self.error_and_terminate(&error.to_string(), None, None);
    }

    fn dispatch(&mut self, command: ClientCommand, receipt: Option<&str>) {
        match command {
            ClientCommand::Connect { login, passcode } => {
                self.handle_connect(&login, &passcode, receipt)
            }
            ClientCommand::Send {
                destination,
                body,
                file_name,
            } => {
                if self.ensure_authenticated(receipt) {
                    self.handle_send(&destination, body, file_name.as_deref(), receipt);
                }
            }
            ClientCommand::Subscribe { destination, id } => {
                if self.ensure_authenticated(receipt) {
                    self.handle_subscribe(destination, id, receipt);
                }
            }
            ClientCommand::Unsubscribe { id } => {
                if self.ensure_authenticated(receipt) {
                    self.handle_unsubscribe(id, receipt);
                }
            }
            ClientCommand::Disconnect => {
                if self.ensure_authenticated(receipt) {
                    self.handle_disconnect(receipt);
                }
            }
        }
    }

    fn handle_connect(&mut self, login: &str, passcode: &str, receipt: Option<&str>) {
        if self.state == SessionState::Authenticated {
            self.error_and_terminate("connection already authenticated", receipt, None);
            return;
        }

        let status = self
            .directory
            .login(self.connection_id, login, passcode);
        match status {
            LoginStatus::NewUser | LoginStatus::LoggedIn => {
                self.state = SessionState::Authenticated;
                self.username = Some(login.to_string());
                let session_id = uuid::Uuid::new_v4().to_string();
                self.send(&Frame::connected(&session_id));
                tracing::info!(
                    connection = self.connection_id,
                    username = login,
                    "client authenticated"
                );
            }
            LoginStatus::AlreadyConnected => {
                self.error_and_terminate("connection already authenticated", receipt, None);
            }
            LoginStatus::AlreadyLoggedIn => {
                self.error_and_terminate("user already logged in elsewhere", receipt, None);
            }
            LoginStatus::WrongPassword => {
                self.error_and_terminate("wrong password", receipt, None);
            }
        }
    }

    fn handle_send(
        &mut self,
        destination: &str,
        body: Bytes,
        file_name: Option<&str>,
        receipt: Option<&str>,
    ) {
        if !self.subscriptions.values().any(|c| c == destination) {
            let message = format!("not subscribed to {destination}");
            if self.config.terminate_on_unsubscribed_send {
                self.error_and_terminate(&message, receipt, None);
            } else {
                self.send(&Frame::error(&message, receipt, None));
            }
            return;
        }

        self.broker.broadcast(destination, body);

        if let (Some(username), Some(file_name)) = (self.username.as_deref(), file_name) {
            self.directory
                .record_file_upload(username, file_name, destination);
        }
        self.send_receipt(receipt);
    }

    fn handle_subscribe(&mut self, destination: String, id: SubscriptionId, receipt: Option<&str>) {
        // One subscription id per channel: drop any other id pointing at the
        // same destination, and release the channel this id previously held.
        self.subscriptions
            .retain(|&other, channel| other == id || channel != &destination);
        if let Some(old_channel) = self.subscriptions.insert(id, destination.clone()) {
            if old_channel != destination {
                self.broker.unsubscribe(self.connection_id, &old_channel);
            }
        }
        self.broker.subscribe(self.connection_id, id, &destination);
        tracing::debug!(
            connection = self.connection_id,
            destination = destination.as_str(),
            subscription = id,
            "subscribed"
        );
        self.send_receipt(receipt);
    }

    fn handle_unsubscribe(&mut self, id: SubscriptionId, receipt: Option<&str>) {
        match self.subscriptions.remove(&id) {
            Some(channel) => {
                self.broker.unsubscribe(self.connection_id, &channel);
                tracing::debug!(
                    connection = self.connection_id,
                    channel = channel.as_str(),
                    subscription = id,
                    "unsubscribed"
                );
            }
            // Unknown subscription id is not a protocol violation.
            None => tracing::debug!(
                connection = self.connection_id,
                subscription = id,
                "unsubscribe for unknown id"
            ),
        }
        self.send_receipt(receipt);
    }

    fn handle_disconnect(&mut self, receipt: Option<&str>) {
        self.send_receipt(receipt);
        self.directory.logout(self.connection_id);
        self.broker.disconnect(self.connection_id);
        self.state = SessionState::Terminated;
        tracing::info!(connection = self.connection_id, "client disconnected");
    }

    /// Rejects any non-CONNECT command on an unauthenticated session.
    fn ensure_authenticated(&mut self, receipt: Option<&str>) -> bool {
        if self.state == SessionState::Authenticated {
            return true;
        }
        self.error_and_terminate("not authenticated", receipt, None);
        false
    }

    fn error_and_terminate(&mut self, message: &str, receipt: Option<&str>, detail: Option<&str>) {
        self.send(&Frame::error(message, receipt, detail));
        self.state = SessionState::Terminated;
        self.broker.disconnect(self.connection_id);
        tracing::info!(
            connection = self.connection_id,
            message,
            "session terminated on protocol error"
        );
    }

    fn send_receipt(&self, receipt: Option<&str>) {
        if let Some(id) = receipt {
            self.send(&Frame::receipt(id));
        }
    }

    fn send(&self, frame: &Frame) {
        self.broker.send_frame(self.connection_id, frame);
    }
}
