//! Credential and audit collaborator.
//!
//! The protocol state machine never talks to credential storage directly; it
//! receives a [`Directory`] at construction. This keeps the broker core
//! independent of how users are persisted and lets tests substitute a fake.

use crate::broker::ConnectionId;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Outcome of a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    /// Username was unknown; it has been registered and logged in.
    NewUser,
    /// Known username, correct password, logged in.
    LoggedIn,
    /// This connection id already completed a login.
    AlreadyConnected,
    /// The username is active on another connection.
    AlreadyLoggedIn,
    /// Known username, wrong password. Internal directory failures also
    /// degrade to this status so a broken collaborator can only ever reject
    /// a CONNECT, never crash a session.
    WrongPassword,
}

impl LoginStatus {
    /// Returns whether the login attempt authenticated the session.
    pub fn is_success(self) -> bool {
        matches!(self, Self::NewUser | Self::LoggedIn)
    }
}

/// A recorded file-upload audit event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub username: String,
    pub filename: String,
    pub channel: String,
}

/// Credential storage and audit log, consumed as a capability.
pub trait Directory: Send + Sync {
    /// Attempts to authenticate `username` on `connection_id`.
    fn login(&self, connection_id: ConnectionId, username: &str, passcode: &str) -> LoginStatus;

    /// Releases the login held by `connection_id`, if any. Idempotent.
    fn logout(&self, connection_id: ConnectionId);

    /// Records a file-upload event. Side effect only; failures are the
    /// implementation's problem, never the session's.
    fn record_file_upload(&self, username: &str, filename: &str, channel: &str);
}

#[derive(Default)]
struct DirectoryState {
    /// Registered users: username -> passcode.
    users: HashMap<String, String>,
    /// Active logins: connection id -> username.
    active: HashMap<ConnectionId, String>,
    /// Audit log of file uploads, oldest first.
    uploads: Vec<FileUpload>,
}

/// In-process directory implementation.
///
/// Unknown usernames are registered on first login, matching the behavior of
/// the persistence service this stands in for.
#[derive(Default)]
pub struct InMemoryDirectory {
    state: Mutex<DirectoryState>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-registers a user without logging them in.
    pub fn add_user(&self, username: impl Into<String>, passcode: impl Into<String>) {
        self.state.lock().users.insert(username.into(), passcode.into());
    }

    /// Returns a snapshot of the directory for reporting.
    pub fn report(&self) -> DirectoryReport {
        let state = self.state.lock();
        let mut users: Vec<String> = state.users.keys().cloned().collect();
        users.sort();
        let mut active: Vec<(ConnectionId, String)> = state
            .active
            .iter()
            .map(|(&id, name)| (id, name.clone()))
            .collect();
        active.sort();
        DirectoryReport {
            users,
            active,
            uploads: state.uploads.clone(),
        }
    }
}

impl Directory for InMemoryDirectory {
    fn login(&self, connection_id: ConnectionId, username: &str, passcode: &str) -> LoginStatus {
        let mut state = self.state.lock();

        if state.active.contains_key(&connection_id) {
            return LoginStatus::AlreadyConnected;
        }
        if state.active.values().any(|name| name == username) {
            return LoginStatus::AlreadyLoggedIn;
        }

        match state.users.get(username) {
            Some(stored) if stored == passcode => {
                state.active.insert(connection_id, username.to_string());
                LoginStatus::LoggedIn
            }
            Some(_) => LoginStatus::WrongPassword,
            None => {
                state.users.insert(username.to_string(), passcode.to_string());
                state.active.insert(connection_id, username.to_string());
                tracing::info!(username, "registered new user");
                LoginStatus::NewUser
            }
        }
    }

    fn logout(&self, connection_id: ConnectionId) {
        let mut state = self.state.lock();
        if let Some(username) = state.active.remove(&connection_id) {
            tracing::info!(username, connection = connection_id, "logged out");
        }
    }

    fn record_file_upload(&self, username: &str, filename: &str, channel: &str) {
        let mut state = self.state.lock();
        state.uploads.push(FileUpload {
            username: username.to_string(),
            filename: filename.to_string(),
            channel: channel.to_string(),
        });
    }
}

/// Point-in-time view of the directory contents.
#[derive(Debug, Clone)]
pub struct DirectoryReport {
    pub users: Vec<String>,
    pub active: Vec<(ConnectionId, String)>,
    pub uploads: Vec<FileUpload>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_user_is_registered() {
        let dir = InMemoryDirectory::new();
        assert_eq!(dir.login(1, "alice", "pw"), LoginStatus::NewUser);
        assert_eq!(dir.report().users, vec!["alice".to_string()]);
    }

    #[test]
    fn test_known_user_correct_password() {
        let dir = InMemoryDirectory::new();
        dir.add_user("alice", "pw");
        assert_eq!(dir.login(1, "alice", "pw"), LoginStatus::LoggedIn);
    }

    #[test]
    fn test_wrong_password() {
        let dir = InMemoryDirectory::new();
        dir.add_user("alice", "pw");
        assert_eq!(dir.login(1, "alice", "nope"), LoginStatus::WrongPassword);
        // Failed attempt must not occupy the connection id.
        assert_eq!(dir.login(1, "alice", "pw"), LoginStatus::LoggedIn);
    }

    #[test]
    fn test_connection_id_cannot_login_twice() {
        let dir = InMemoryDirectory::new();
        assert_eq!(dir.login(1, "alice", "pw"), LoginStatus::NewUser);
        assert_eq!(dir.login(1, "bob", "pw"), LoginStatus::AlreadyConnected);
    }

    #[test]
    fn test_user_cannot_be_active_twice() {
        let dir = InMemoryDirectory::new();
        assert_eq!(dir.login(1, "alice", "pw"), LoginStatus::NewUser);
        assert_eq!(dir.login(2, "alice", "pw"), LoginStatus::AlreadyLoggedIn);
    }

    #[test]
    fn test_logout_frees_username_and_is_idempotent() {
        let dir = InMemoryDirectory::new();
        dir.login(1, "alice", "pw");
        dir.logout(1);
        dir.logout(1);
        assert_eq!(dir.login(2, "alice", "pw"), LoginStatus::LoggedIn);
    }

    #[test]
    fn test_file_uploads_are_recorded() {
        let dir = InMemoryDirectory::new();
        dir.record_file_upload("alice", "scores.csv", "news");
        let report = dir.report();
        assert_eq!(
            report.uploads,
            vec![FileUpload {
                username: "alice".to_string(),
                filename: "scores.csv".to_string(),
                channel: "news".to_string(),
            }]
        );
    }
}
