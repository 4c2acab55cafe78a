//! Session registry: who is logged in.
//!
//! Maps username → current token. Every mutation is atomic per username
//! (one `DashMap` shard lock), so unrelated logins never contend on a
//! registry-wide lock.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use relay_core::SessionToken;
use tracing::debug;

use crate::errors::RuntimeError;

/// One live session.
#[derive(Clone, Debug)]
pub struct ActiveSession {
    /// Token issued at login.
    pub token: SessionToken,
    /// When the session was created.
    pub logged_in_at: DateTime<Utc>,
}

/// Result of [`SessionRegistry::remove`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Removal {
    /// The session existed with the given token and is gone.
    Removed,
    /// No session for that username, or the token did not match. Nothing
    /// was changed.
    NotFound,
}

/// Process-wide table of authenticated users.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, ActiveSession>,
    count: AtomicUsize,
    max_sessions: usize,
}

impl SessionRegistry {
    /// Registry without a session limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry admitting at most `max_sessions` users. `0` means unlimited.
    pub fn with_max_sessions(max_sessions: usize) -> Self {
        Self {
            max_sessions,
            ..Self::default()
        }
    }

    /// Create a session for `username` and return its fresh token.
    ///
    /// Of several concurrent calls for the same username exactly one
    /// succeeds.
    pub fn create(&self, username: &str) -> Result<SessionToken, RuntimeError> {
        match self.sessions.entry(username.to_owned()) {
            Entry::Occupied(_) => Err(RuntimeError::AlreadyExists(username.to_owned())),
            Entry::Vacant(slot) => {
                self.reserve()?;
                let token = SessionToken::new();
                let _ = slot.insert(ActiveSession {
                    token: token.clone(),
                    logged_in_at: Utc::now(),
                });
                debug!(username, "session created");
                Ok(token)
            }
        }
    }

    fn reserve(&self) -> Result<(), RuntimeError> {
        let max = self.max_sessions;
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (max == 0 || n < max).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|_| RuntimeError::CapacityReached(max))
    }

    /// Whether `token` is exactly the current token for `username`.
    pub fn validate(&self, username: &str, token: &str) -> bool {
        self.sessions
            .get(username)
            .is_some_and(|s| s.token.as_str() == token)
    }

    /// Current token for `username`, if logged in.
    pub fn current_token(&self, username: &str) -> Option<SessionToken> {
        self.sessions.get(username).map(|s| s.token.clone())
    }

    /// When `username` logged in, if they are logged in.
    pub fn logged_in_at(&self, username: &str) -> Option<DateTime<Utc>> {
        self.sessions.get(username).map(|s| s.logged_in_at)
    }

    /// Remove the session only if `token` is its current token.
    pub fn remove(&self, username: &str, token: &str) -> Removal {
        if self
            .sessions
            .remove_if(username, |_, s| s.token.as_str() == token)
            .is_some()
        {
            let _ = self.count.fetch_sub(1, Ordering::AcqRel);
            debug!(username, "session removed");
            Removal::Removed
        } else {
            Removal::NotFound
        }
    }

    /// Usernames of everyone logged in, sorted.
    ///
    /// Consistent per shard; a login or logout racing with the snapshot may
    /// or may not be included.
    pub fn snapshot(&self) -> BTreeSet<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether nobody is logged in.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Configured limit (`0` = unlimited).
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }
}
