//! Session service: login, logout and roster queries.

use std::sync::Arc;

use relay_core::{CloseReason, SessionToken};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::channel::ChatChannel;
use crate::errors::RuntimeError;
use crate::sessions::{Removal, SessionRegistry};
use crate::sink::ClientSink;
use crate::streams::StreamRegistry;

/// Business outcome carried in a response's `status` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Request succeeded.
    Ok,
    /// Expected rejection (username taken, unknown or mismatched session).
    Failed,
}

/// Result of [`SessionService::login`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    /// New session with its token.
    Ok(SessionToken),
    /// Username already logged in.
    Failed,
}

impl LoginOutcome {
    /// Wire status.
    pub fn status(&self) -> Status {
        match self {
            Self::Ok(_) => Status::Ok,
            Self::Failed => Status::Failed,
        }
    }

    /// Token, when the login succeeded.
    pub fn token(&self) -> Option<&SessionToken> {
        match self {
            Self::Ok(token) => Some(token),
            Self::Failed => None,
        }
    }
}

/// Result of [`SessionService::logout`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// Session ended.
    Ok {
        /// Whether an open chat stream was torn down with it.
        stream_closed: bool,
    },
    /// No such session, or the token did not match.
    Failed,
}

impl LogoutOutcome {
    /// Wire status.
    pub fn status(&self) -> Status {
        match self {
            Self::Ok { .. } => Status::Ok,
            Self::Failed => Status::Failed,
        }
    }
}

/// Process-wide chat state: both registries plus the operations on them.
///
/// Constructed once at startup and shared by every connection.
#[derive(Debug, Default)]
pub struct SessionService {
    sessions: Arc<SessionRegistry>,
    streams: Arc<StreamRegistry>,
}

impl SessionService {
    /// Service over fresh registries; `max_sessions == 0` means unlimited.
    pub fn new(max_sessions: usize) -> Self {
        Self::with_registries(
            Arc::new(SessionRegistry::with_max_sessions(max_sessions)),
            Arc::new(StreamRegistry::new()),
        )
    }

    /// Service over existing registries.
    pub fn with_registries(sessions: Arc<SessionRegistry>, streams: Arc<StreamRegistry>) -> Self {
        Self { sessions, streams }
    }

    /// Log `username` in.
    ///
    /// A taken username is an expected outcome, not an error. Only a full
    /// registry is an error.
    #[instrument(skip(self))]
    pub fn login(&self, username: &str) -> Result<LoginOutcome, RuntimeError> {
        match self.sessions.create(username) {
            Ok(token) => {
                info!(username, "user logged in");
                Ok(LoginOutcome::Ok(token))
            }
            Err(RuntimeError::AlreadyExists(_)) => {
                info!(username, "login rejected, username taken");
                Ok(LoginOutcome::Failed)
            }
            Err(e) => {
                warn!(username, error = %e, "login rejected");
                Err(e)
            }
        }
    }

    /// Log `username` out if `token` is their current token.
    ///
    /// A successful logout also removes the user's stream entry and closes
    /// that stream, so broadcast delivery to them stops immediately.
    #[instrument(skip(self, token))]
    pub fn logout(&self, username: &str, token: &str) -> LogoutOutcome {
        if self.sessions.remove(username, token) == Removal::NotFound {
            info!(username, "logout rejected, no matching session");
            return LogoutOutcome::Failed;
        }
        let stream_closed = match self.streams.remove(token) {
            Some(sink) => {
                let _ = sink.close(CloseReason::LoggedOut);
                true
            }
            None => false,
        };
        info!(username, stream_closed, "user logged out");
        LogoutOutcome::Ok { stream_closed }
    }

    /// Sorted usernames of everyone logged in, if the caller is.
    #[instrument(skip(self, token))]
    pub fn list_users(&self, username: &str, token: &str) -> Result<Vec<String>, RuntimeError> {
        if !self.sessions.validate(username, token) {
            warn!(username, "list users rejected, invalid session");
            return Err(RuntimeError::PermissionDenied);
        }
        Ok(self.sessions.snapshot().into_iter().collect())
    }

    /// Start the broadcast state machine for a newly opened chat stream.
    pub fn open_channel(&self, sink: Arc<ClientSink>) -> ChatChannel {
        ChatChannel::new(self.sessions.clone(), self.streams.clone(), sink)
    }

    /// Session registry.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Stream registry.
    pub fn streams(&self) -> &Arc<StreamRegistry> {
        &self.streams
    }
}
