//! Stream termination reasons.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a chat stream or RPC socket was closed by the server.
///
/// Each reason maps onto a WebSocket close code. Codes in the 4000 range are
/// application-defined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Client closed or the stream ended cleanly.
    Normal,
    /// Server is shutting down.
    ServerShutdown,
    /// Inbound frame could not be decoded.
    MalformedMessage,
    /// Token did not match the current session for the claimed username.
    Unauthenticated,
    /// Inbound body exceeded the configured limit.
    MessageTooLarge,
    /// The session owning this stream logged out.
    LoggedOut,
    /// Too many undelivered messages to this recipient.
    SlowConsumer,
    /// No pong within the heartbeat timeout.
    HeartbeatTimeout,
}

impl CloseReason {
    /// WebSocket close code.
    pub fn code(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::ServerShutdown => 1001,
            Self::MalformedMessage => 1007,
            Self::Unauthenticated => 1008,
            Self::MessageTooLarge => 1009,
            Self::LoggedOut => 4000,
            Self::SlowConsumer => 4001,
            Self::HeartbeatTimeout => 4002,
        }
    }

    /// Map a close code received from the peer back to a reason.
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1000 => Self::Normal,
            1001 => Self::ServerShutdown,
            1007 => Self::MalformedMessage,
            1008 => Self::Unauthenticated,
            1009 => Self::MessageTooLarge,
            4000 => Self::LoggedOut,
            4001 => Self::SlowConsumer,
            4002 => Self::HeartbeatTimeout,
            _ => return None,
        })
    }

    /// Short human-readable text sent as the close frame reason.
    pub fn description(self) -> &'static str {
        match self {
            Self::Normal => "closed",
            Self::ServerShutdown => "server shutting down",
            Self::MalformedMessage => "malformed message",
            Self::Unauthenticated => "authentication failed",
            Self::MessageTooLarge => "message too large",
            Self::LoggedOut => "logged out",
            Self::SlowConsumer => "slow consumer",
            Self::HeartbeatTimeout => "heartbeat timeout",
        }
    }

    /// Stable snake_case name, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::ServerShutdown => "server_shutdown",
            Self::MalformedMessage => "malformed_message",
            Self::Unauthenticated => "unauthenticated",
            Self::MessageTooLarge => "message_too_large",
            Self::LoggedOut => "logged_out",
            Self::SlowConsumer => "slow_consumer",
            Self::HeartbeatTimeout => "heartbeat_timeout",
        }
    }

    /// Whether this close reflects a fault on the client's side.
    pub fn is_client_fault(self) -> bool {
        matches!(
            self,
            Self::MalformedMessage
                | Self::Unauthenticated
                | Self::MessageTooLarge
                | Self::SlowConsumer
                | Self::HeartbeatTimeout
        )
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
