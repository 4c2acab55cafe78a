//! WebSocket endpoints: `/ws` RPC sessions and `/chat` streams.

pub mod chat_session;
pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod outbound;
pub mod rpc_session;

use std::time::Duration;

use crate::config::ServerConfig;

/// Which endpoint a socket was opened on; used as a metrics label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// `/ws`
    Rpc,
    /// `/chat`
    Chat,
}

impl Endpoint {
    /// Label value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rpc => "rpc",
            Self::Chat => "chat",
        }
    }
}

/// Per-socket limits derived from [`ServerConfig`].
#[derive(Clone, Copy, Debug)]
pub struct SocketConfig {
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// Silence after which the client is dropped.
    pub heartbeat_timeout: Duration,
    /// Outbound queue capacity, in frames.
    pub outbound_queue_size: usize,
    /// Longest accepted chat body, in bytes.
    pub max_body_len: usize,
}

impl From<&ServerConfig> for SocketConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_timeout: config.heartbeat_timeout(),
            outbound_queue_size: config.outbound_queue_size,
            max_body_len: config.max_body_len,
        }
    }
}
