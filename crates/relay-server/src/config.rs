//! Server configuration.

use std::time::Duration;

use relay_settings::RelaySettings;
use serde::{Deserialize, Serialize};

/// Runtime configuration for [`RelayServer`](crate::RelayServer).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Heartbeat timeout in seconds.
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket frame/message size in bytes.
    pub max_message_size: usize,
    /// Per-handler RPC timeout in seconds.
    pub request_timeout_secs: u64,
    /// Maximum concurrent sessions (`0` = unlimited).
    pub max_sessions: usize,
    /// Maximum chat body length in bytes.
    pub max_body_len: usize,
    /// Maximum username length in bytes.
    pub max_username_len: usize,
    /// Outbound queue capacity per connection, in frames.
    pub outbound_queue_size: usize,
}

impl ServerConfig {
    /// Heartbeat interval as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Heartbeat timeout as a `Duration`.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// RPC handler timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Same config on a different port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&RelaySettings::default()).with_port(0)
    }
}

impl From<&RelaySettings> for ServerConfig {
    fn from(settings: &RelaySettings) -> Self {
        let server = &settings.server;
        let chat = &settings.chat;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            heartbeat_interval_secs: server.heartbeat_interval_secs,
            heartbeat_timeout_secs: server.heartbeat_timeout_secs,
            max_message_size: server.max_frame_size,
            request_timeout_secs: server.request_timeout_secs,
            max_sessions: chat.max_sessions,
            max_body_len: chat.max_body_len,
            max_username_len: chat.max_username_len,
            outbound_queue_size: chat.outbound_queue_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_zero() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.host, "127.0.0.1");
    }

    #[test]
    fn defaults_follow_settings() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_connections, 256);
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_secs(90));
        assert_eq!(cfg.max_message_size, 65_536);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.max_sessions, 0);
        assert_eq!(cfg.max_body_len, 4096);
        assert_eq!(cfg.max_username_len, 64);
        assert_eq!(cfg.outbound_queue_size, 256);
    }

    #[test]
    fn from_settings_keeps_port() {
        let mut settings = RelaySettings::default();
        settings.server.port = 7000;
        settings.chat.max_sessions = 3;
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.max_sessions, 3);
        assert_eq!(cfg.bind_addr(), "127.0.0.1:7000");
    }

    #[test]
    fn deserialize_from_json_string() {
        let json = serde_json::to_string(&ServerConfig::default()).unwrap();
        let cfg: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.max_body_len, 4096);
    }
}
