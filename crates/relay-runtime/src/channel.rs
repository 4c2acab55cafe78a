//! Per-stream broadcast state machine.
//!
//! ```text
//! Unbound ──valid message──▶ Bound{username, token} ──close/auth failure──▶ Closed
//!    └──────────────auth failure / close──────────────────────────────────────┘
//! ```
//!
//! Every inbound message is re-validated against the session registry, so a
//! logout or re-login invalidates the stream on its next message.

use std::sync::Arc;

use relay_core::{ClientMessage, CloseReason, RelayedMessage, SessionToken};
use tracing::{debug, warn};

use crate::sessions::SessionRegistry;
use crate::sink::ClientSink;
use crate::streams::{BroadcastReport, StreamRegistry};

/// Errors returned by [`ChatChannel::on_message`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The channel is closed and accepts no more messages.
    #[error("chat channel is closed")]
    Closed,

    /// The message's token is not the current token for its username. The
    /// channel is now closed.
    #[error("authentication failed for {username}")]
    Unauthenticated {
        /// Username the message claimed.
        username: String,
    },
}

/// Lifecycle state of one chat stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// Open, no valid message yet.
    Unbound,
    /// A valid message bound the stream to this session.
    Bound {
        /// Session username.
        username: String,
        /// Session token, the key of this stream's registry entry.
        token: SessionToken,
    },
    /// Terminal.
    Closed,
}

/// Broadcast state machine owned by one chat stream's task.
#[derive(Debug)]
pub struct ChatChannel {
    sessions: Arc<SessionRegistry>,
    streams: Arc<StreamRegistry>,
    sink: Arc<ClientSink>,
    state: ChannelState,
}

impl ChatChannel {
    /// New channel in the `Unbound` state.
    pub fn new(
        sessions: Arc<SessionRegistry>,
        streams: Arc<StreamRegistry>,
        sink: Arc<ClientSink>,
    ) -> Self {
        Self {
            sessions,
            streams,
            sink,
            state: ChannelState::Unbound,
        }
    }

    /// Validate `message` and relay it to every other open stream.
    ///
    /// The first valid message binds the channel and registers its sink.
    /// It is relayed like any later message.
    pub fn on_message(&mut self, message: ClientMessage) -> Result<BroadcastReport, ChannelError> {
        let ClientMessage {
            username,
            token,
            body,
        } = message;

        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        let other_session = matches!(
            &self.state,
            ChannelState::Bound { username: u, token: t } if *u != username || *t != token
        );
        if other_session {
            return Err(self.fail_auth(username));
        }

        let current = self.sessions.current_token(&username);
        if current.as_ref() != Some(&token) {
            return Err(self.fail_auth(username));
        }

        if self.state == ChannelState::Unbound {
            self.bind(&username, token)?;
        }

        let frame = Arc::new(RelayedMessage::new(username, body).to_json());
        Ok(self.streams.broadcast_except(self.sink.id(), &frame))
    }

    fn bind(&mut self, username: &str, token: SessionToken) -> Result<(), ChannelError> {
        let registered = self
            .streams
            .register_if_absent(token.clone(), self.sink.clone());
        if !registered {
            debug!(
                conn_id = %self.sink.id(),
                username,
                "session already has an open stream; binding without registering"
            );
        }
        // A logout between validation and registration would orphan the entry.
        if !self.sessions.validate(username, &token) {
            if registered {
                let _ = self.streams.release(&token, self.sink.id());
            }
            return Err(self.fail_auth(username.to_owned()));
        }
        debug!(conn_id = %self.sink.id(), username, "chat channel bound");
        self.state = ChannelState::Bound {
            username: username.to_owned(),
            token,
        };
        Ok(())
    }

    fn fail_auth(&mut self, username: String) -> ChannelError {
        warn!(conn_id = %self.sink.id(), username = %username, "chat authentication failed");
        let _ = self.close(CloseReason::Unauthenticated);
        ChannelError::Unauthenticated { username }
    }

    /// Close the channel and release its stream entry.
    ///
    /// Idempotent. Returns `true` for the call that performed the close. The
    /// sink keeps whichever close reason was recorded first.
    pub fn close(&mut self, reason: CloseReason) -> bool {
        match std::mem::replace(&mut self.state, ChannelState::Closed) {
            ChannelState::Closed => return false,
            ChannelState::Bound { token, username } => {
                if self.streams.release(&token, self.sink.id()) {
                    debug!(conn_id = %self.sink.id(), username = %username, %reason, "chat stream deregistered");
                }
            }
            ChannelState::Unbound => {}
        }
        let _ = self.sink.close(reason);
        true
    }

    /// Current state.
    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    /// Whether the channel is closed.
    pub fn is_closed(&self) -> bool {
        self.state == ChannelState::Closed
    }

    /// Bound username, if any.
    pub fn username(&self) -> Option<&str> {
        match &self.state {
            ChannelState::Bound { username, .. } => Some(username),
            _ => None,
        }
    }

    /// This channel's sink.
    pub fn sink(&self) -> &Arc<ClientSink> {
        &self.sink
    }
}

impl Drop for ChatChannel {
    fn drop(&mut self) {
        let _ = self.close(CloseReason::Normal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::SessionService;
    use assert_matches::assert_matches;
    use tokio::sync::mpsc;

    struct Client {
        channel: ChatChannel,
        rx: mpsc::Receiver<Arc<String>>,
    }

    impl Client {
        fn open(svc: &SessionService) -> Self {
            let (sink, rx) = ClientSink::channel(32);
            Self {
                channel: svc.open_channel(sink),
                rx,
            }
        }

        fn received(&mut self) -> Vec<RelayedMessage> {
            let mut out = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                out.push(serde_json::from_str(&frame).unwrap());
            }
            out
        }
    }

    fn login(svc: &SessionService, name: &str) -> SessionToken {
        svc.login(name).unwrap().token().unwrap().clone()
    }

    #[tokio::test]
    async fn first_valid_message_binds_and_registers() {
        let svc = SessionService::new(0);
        let ta = login(&svc, "alice");
        let mut a = Client::open(&svc);
        assert_eq!(a.channel.state(), &ChannelState::Unbound);

        let report = a
            .channel
            .on_message(ClientMessage::new("alice", ta.clone(), "Joined chat as alice"))
            .unwrap();
        assert_eq!(report.recipients, 0);
        assert_eq!(a.channel.username(), Some("alice"));
        assert!(svc.streams().contains(&ta));
    }

    #[tokio::test]
    async fn two_user_exchange() {
        let svc = SessionService::new(0);
        let ta = login(&svc, "alice");
        let tb = login(&svc, "bob");
        let mut a = Client::open(&svc);
        let mut b = Client::open(&svc);

        // Bind both before exchanging so each can receive the other's message.
        let _ = a.channel.on_message(ClientMessage::new("alice", ta.clone(), "join")).unwrap();
        let _ = b.channel.on_message(ClientMessage::new("bob", tb.clone(), "join")).unwrap();
        let _ = a.received();
        let _ = b.received();

        let _ = a.channel.on_message(ClientMessage::new("alice", ta.clone(), "hi bob")).unwrap();
        let _ = b.channel.on_message(ClientMessage::new("bob", tb.clone(), "hi alice")).unwrap();

        assert_eq!(a.received(), [RelayedMessage::new("bob", "hi alice")]);
        assert_eq!(b.received(), [RelayedMessage::new("alice", "hi bob")]);
        assert_eq!(svc.list_users("alice", &ta).unwrap(), ["alice", "bob"]);
    }

    #[tokio::test]
    async fn first_message_is_broadcast() {
        let svc = SessionService::new(0);
        let ta = login(&svc, "alice");
        let tb = login(&svc, "bob");
        let mut a = Client::open(&svc);
        let mut b = Client::open(&svc);
        let _ = a.channel.on_message(ClientMessage::new("alice", ta, "hello")).unwrap();
        let _ = b.channel.on_message(ClientMessage::new("bob", tb, "Joined chat as bob")).unwrap();
        assert_eq!(a.received(), [RelayedMessage::new("bob", "Joined chat as bob")]);
    }

    #[tokio::test]
    async fn bad_token_closes_without_broadcast() {
        let svc = SessionService::new(0);
        let ta = login(&svc, "alice");
        let _ = login(&svc, "mallory");
        let mut a = Client::open(&svc);
        let mut m = Client::open(&svc);
        let _ = a.channel.on_message(ClientMessage::new("alice", ta, "join")).unwrap();

        let err = m
            .channel
            .on_message(ClientMessage::new("alice", "forged", "evil"))
            .unwrap_err();
        assert_matches!(err, ChannelError::Unauthenticated { username } if username == "alice");
        assert!(m.channel.is_closed());
        assert_eq!(m.channel.sink().close_reason(), Some(CloseReason::Unauthenticated));
        assert!(a.received().is_empty());
        assert_eq!(svc.streams().len(), 1);
    }

    #[tokio::test]
    async fn unknown_user_is_auth_failure() {
        let svc = SessionService::new(0);
        let mut c = Client::open(&svc);
        let err = c
            .channel
            .on_message(ClientMessage::new("ghost", "t", "boo"))
            .unwrap_err();
        assert_matches!(err, ChannelError::Unauthenticated { .. });
        assert!(svc.streams().is_empty());
    }

    #[tokio::test]
    async fn closed_channel_rejects_messages() {
        let svc = SessionService::new(0);
        let ta = login(&svc, "alice");
        let mut a = Client::open(&svc);
        assert!(a.channel.close(CloseReason::Normal));
        assert!(!a.channel.close(CloseReason::Normal));
        assert_eq!(
            a.channel.on_message(ClientMessage::new("alice", ta, "late")),
            Err(ChannelError::Closed)
        );
    }

    #[tokio::test]
    async fn close_deregisters_exactly_once() {
        let svc = SessionService::new(0);
        let ta = login(&svc, "alice");
        let tb = login(&svc, "bob");
        let mut a = Client::open(&svc);
        let mut b = Client::open(&svc);
        let _ = a.channel.on_message(ClientMessage::new("alice", ta.clone(), "j")).unwrap();
        let _ = b.channel.on_message(ClientMessage::new("bob", tb.clone(), "j")).unwrap();
        let _ = a.received();

        assert!(a.channel.close(CloseReason::Normal));
        assert!(!svc.streams().contains(&ta));

        let report = b
            .channel
            .on_message(ClientMessage::new("bob", tb, "anyone?"))
            .unwrap();
        assert_eq!(report.recipients, 0);
        assert!(a.received().is_empty());
    }

    #[tokio::test]
    async fn drop_releases_entry() {
        let svc = SessionService::new(0);
        let ta = login(&svc, "alice");
        {
            let mut a = Client::open(&svc);
            let _ = a.channel.on_message(ClientMessage::new("alice", ta.clone(), "j")).unwrap();
            assert!(svc.streams().contains(&ta));
        }
        assert!(!svc.streams().contains(&ta));
    }

    #[tokio::test]
    async fn logout_invalidates_stale_channel() {
        let svc = SessionService::new(0);
        let ta = login(&svc, "alice");
        let mut a = Client::open(&svc);
        let _ = a.channel.on_message(ClientMessage::new("alice", ta.clone(), "j")).unwrap();

        assert_eq!(svc.logout("alice", &ta).status(), crate::service::Status::Ok);
        assert_eq!(a.channel.sink().close_reason(), Some(CloseReason::LoggedOut));

        let err = a
            .channel
            .on_message(ClientMessage::new("alice", ta, "still here?"))
            .unwrap_err();
        assert_matches!(err, ChannelError::Unauthenticated { .. });
        // First close reason is kept.
        assert_eq!(a.channel.sink().close_reason(), Some(CloseReason::LoggedOut));
    }

    #[tokio::test]
    async fn relogin_invalidates_old_token() {
        let svc = SessionService::new(0);
        let old = login(&svc, "alice");
        let mut a = Client::open(&svc);
        let _ = a.channel.on_message(ClientMessage::new("alice", old.clone(), "j")).unwrap();

        let _ = svc.sessions().remove("alice", &old);
        let _ = login(&svc, "alice");
        assert!(a.channel.on_message(ClientMessage::new("alice", old, "x")).is_err());
    }

    #[tokio::test]
    async fn bound_channel_rejects_other_session() {
        let svc = SessionService::new(0);
        let ta = login(&svc, "alice");
        let tb = login(&svc, "bob");
        let mut a = Client::open(&svc);
        let _ = a.channel.on_message(ClientMessage::new("alice", ta.clone(), "j")).unwrap();

        let err = a
            .channel
            .on_message(ClientMessage::new("bob", tb, "switch"))
            .unwrap_err();
        assert_matches!(err, ChannelError::Unauthenticated { username } if username == "bob");
        assert!(!svc.streams().contains(&ta));
    }

    #[tokio::test]
    async fn second_stream_same_token_cannot_evict_first() {
        let svc = SessionService::new(0);
        let ta = login(&svc, "alice");
        let tb = login(&svc, "bob");
        let mut first = Client::open(&svc);
        let mut second = Client::open(&svc);
        let mut b = Client::open(&svc);

        let _ = first.channel.on_message(ClientMessage::new("alice", ta.clone(), "1")).unwrap();
        let _ = second.channel.on_message(ClientMessage::new("alice", ta.clone(), "2")).unwrap();
        assert_eq!(second.channel.username(), Some("alice"));

        let _ = second.channel.close(CloseReason::Normal);
        assert_eq!(
            svc.streams().get(&ta).unwrap().id(),
            first.channel.sink().id()
        );

        let _ = b.channel.on_message(ClientMessage::new("bob", tb, "hey")).unwrap();
        assert_eq!(first.received().last(), Some(&RelayedMessage::new("bob", "hey")));
    }

    #[tokio::test]
    async fn auth_failure_is_logged() {
        let (logs, _guard) = relay_logging::capture_logs();
        let svc = SessionService::new(0);
        let mut c = Client::open(&svc);
        let _ = c.channel.on_message(ClientMessage::new("ghost", "t", "boo"));
        assert!(logs.has_event(tracing::Level::WARN, "chat authentication failed"));
    }
}
