//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may contain any subset of fields.

mod chat;
mod server;

pub use chat::ChatSettings;
pub use relay_logging::LogFormat;
pub use server::ServerSettings;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 6000 },
///   "chat": { "maxSessions": 100 },
///   "logging": { "level": "debug", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Network and connection settings.
    pub server: ServerSettings,
    /// Session and message limits.
    pub chat: ChatSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        if server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalSecs must be positive".into(),
            ));
        }
        if server.heartbeat_timeout_secs < server.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "server.heartbeatTimeoutSecs ({}) is shorter than server.heartbeatIntervalSecs ({})",
                server.heartbeat_timeout_secs, server.heartbeat_interval_secs
            )));
        }
        if server.request_timeout_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.requestTimeoutSecs must be positive".into(),
            ));
        }
        let chat = &self.chat;
        if chat.outbound_queue_size == 0 {
            return Err(SettingsError::InvalidValue(
                "chat.outboundQueueSize must be positive".into(),
            ));
        }
        if chat.max_body_len == 0 || chat.max_username_len == 0 {
            return Err(SettingsError::InvalidValue(
                "chat length limits must be positive".into(),
            ));
        }
        if chat.max_body_len >= server.max_frame_size {
            return Err(SettingsError::InvalidValue(format!(
                "chat.maxBodyLen ({}) must be smaller than server.maxFrameSize ({})",
                chat.max_body_len, server.max_frame_size
            )));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level, as an `EnvFilter` directive.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
