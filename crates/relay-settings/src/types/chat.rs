//! Session and chat message limits.

use serde::{Deserialize, Serialize};

/// Limits applied by the session registry and the chat stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    /// Maximum concurrent logged-in users. `0` means unlimited.
    pub max_sessions: usize,
    /// Maximum chat body length in bytes.
    pub max_body_len: usize,
    /// Maximum username length in bytes.
    pub max_username_len: usize,
    /// Per-connection outbound queue capacity, in frames.
    pub outbound_queue_size: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_sessions: 0,
            max_body_len: 4096,
            max_username_len: 64,
            outbound_queue_size: 256,
        }
    }
}
