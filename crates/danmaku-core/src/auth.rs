//! Per-connection sessions and the admin password gate.
//!
//! A [`Session`] starts as a viewer. The only way to raise it to admin is
//! [`AdminGate::login`] with the configured password, and nothing lowers it
//! again: the flag lives exactly as long as the connection.

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::ids::SessionId;

/// State attached to one live connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    is_admin: bool,
}

impl Session {
    /// Create a non-admin session.
    pub fn new(id: SessionId) -> Self {
        Self { id, is_admin: false }
    }

    /// The session's identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Whether this session has logged in as admin.
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }
}

/// Result of a login attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoginOutcome {
    /// Whether admin rights were granted.
    pub granted: bool,
}

/// Grants admin rights to sessions presenting the configured password.
#[derive(Debug)]
pub struct AdminGate {
    password: SecretString,
}

impl AdminGate {
    /// Create a gate for `password`. An empty password disables admin login.
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: SecretString::from(password.into()),
        }
    }

    /// Whether any login can succeed.
    pub fn is_enabled(&self) -> bool {
        !self.password.expose_secret().is_empty()
    }

    /// Compare `supplied` with the configured password.
    ///
    /// On an exact match the session becomes admin. On a mismatch the
    /// session is left as it was.
    pub fn login(&self, session: &mut Session, supplied: &str) -> LoginOutcome {
        let granted = self.is_enabled() && supplied == self.password.expose_secret();
        if granted {
            session.is_admin = true;
        }
        debug!(session_id = %session.id, granted, "admin login attempt");
        LoginOutcome { granted }
    }

    /// Whether `session` may perform admin operations.
    pub fn authorize(&self, session: &Session) -> bool {
        session.is_admin
    }
}
