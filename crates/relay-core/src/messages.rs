//! Chat stream frames.
//!
//! Both directions carry one JSON object per WebSocket text frame, with
//! camelCase field names.

use serde::{Deserialize, Serialize};

use crate::ids::SessionToken;

/// Errors decoding an inbound chat frame.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// Frame was not a valid `ClientMessage` JSON object.
    #[error("malformed chat message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Frame bytes were not valid UTF-8.
    #[error("chat message is not valid UTF-8")]
    NotUtf8,
}

/// Inbound chat frame: the claimed identity plus the text to relay.
///
/// Every frame carries the username and token, and each one is validated
/// against the session registry independently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    /// Username the sender claims to be.
    pub username: String,
    /// Token issued to that username at login.
    pub token: SessionToken,
    /// Message text.
    pub body: String,
}

impl ClientMessage {
    /// Build a frame.
    pub fn new(
        username: impl Into<String>,
        token: impl Into<SessionToken>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
            body: body.into(),
        }
    }

    /// Decode a text frame.
    pub fn from_json(text: &str) -> Result<Self, MessageError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode a binary frame holding UTF-8 JSON.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        let text = std::str::from_utf8(bytes).map_err(|_| MessageError::NotUtf8)?;
        Self::from_json(text)
    }
}

/// Outbound chat frame delivered to every other open stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayedMessage {
    /// Username of the sender, as validated.
    pub sender_username: String,
    /// Message text.
    pub body: String,
}

impl RelayedMessage {
    /// Build a frame.
    pub fn new(sender_username: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender_username: sender_username.into(),
            body: body.into(),
        }
    }

    /// Serialize to the wire representation.
    pub fn to_json(&self) -> String {
        // Two string fields; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
