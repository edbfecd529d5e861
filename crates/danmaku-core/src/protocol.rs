//! Wire events exchanged over a viewer connection.
//!
//! Every frame is a JSON object `{"type": <name>, "data": <payload>}` with
//! camelCase names in both directions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::display::{BackgroundDescriptor, DisplaySettings};
use crate::errors::ProtocolError;

/// Event sent by a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Post a message to the shared screen.
    SendDanmaku {
        /// Message body. Trimmed before use.
        #[serde(default)]
        text: String,
        /// CSS color, defaults to white when missing or empty.
        #[serde(default)]
        color: Option<String>,
    },
    /// Try to become admin.
    AdminLogin {
        /// Supplied password.
        #[serde(default)]
        password: String,
    },
    /// Partial display settings update. Kept as raw JSON so that
    /// wrong-typed fields can be skipped one by one.
    AdminUpdateSettings(Value),
    /// Replace the shared background.
    AdminSetBackground(BackgroundDescriptor),
    /// Add a word to the blocklist.
    AdminAddBannedWord {
        /// Word to add.
        #[serde(default)]
        word: String,
    },
    /// Remove a word from the blocklist.
    AdminRemoveBannedWord {
        /// Word to remove.
        #[serde(default)]
        word: String,
    },
}

impl ClientEvent {
    /// Decode a text frame.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Decode a binary frame that carries UTF-8 JSON.
    pub fn decode_bytes(frame: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(frame).map_err(|_| ProtocolError::NotUtf8)?;
        Self::decode(text)
    }

    /// Wire name of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SendDanmaku { .. } => "sendDanmaku",
            Self::AdminLogin { .. } => "adminLogin",
            Self::AdminUpdateSettings(_) => "adminUpdateSettings",
            Self::AdminSetBackground(_) => "adminSetBackground",
            Self::AdminAddBannedWord { .. } => "adminAddBannedWord",
            Self::AdminRemoveBannedWord { .. } => "adminRemoveBannedWord",
        }
    }

    /// Whether this event needs an admin session.
    pub fn is_privileged(&self) -> bool {
        !matches!(self, Self::SendDanmaku { .. } | Self::AdminLogin { .. })
    }
}

/// Full state sent on connect and after every accepted mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Current display settings.
    pub settings: DisplaySettings,
    /// Current blocklist, in insertion order.
    pub banned_words: Vec<String>,
}

/// Event sent by the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Full state snapshot.
    State(Snapshot),
    /// An accepted message, broadcast to every viewer.
    Danmaku {
        /// Trimmed message body.
        text: String,
        /// Display color.
        color: String,
        /// Assigned lane.
        lane: u32,
    },
    /// The sender's message was rejected by the blocklist.
    BannedAlert {
        /// Always `false`.
        ok: bool,
        /// Human-readable reason.
        error: String,
    },
    /// Reply to an admin login attempt.
    AdminLoginResult {
        /// Whether the login succeeded.
        ok: bool,
        /// Reason for failure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ServerEvent {
    /// Wire name of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::State(_) => "state",
            Self::Danmaku { .. } => "danmaku",
            Self::BannedAlert { .. } => "bannedAlert",
            Self::AdminLoginResult { .. } => "adminLoginResult",
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> String {
        // Every variant is a plain struct with string keys.
        serde_json::to_string(self).unwrap_or_default()
    }
}
