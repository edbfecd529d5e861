//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a
//! settings file may name any subset of fields and the rest keep their
//! compiled defaults.

mod display;
mod server;

pub use display::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the relay.
///
/// ```json
/// {
///   "server": { "port": 8080 },
///   "admin": { "password": "change-me" },
///   "display": { "lanes": 12, "bannedWords": ["spam"] }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DanmakuSettings {
    /// Listener settings.
    pub server: ServerSettings,
    /// Upload endpoint settings.
    pub upload: UploadSettings,
    /// Admin credentials.
    pub admin: AdminSettings,
    /// Initial display state.
    pub display: DisplayDefaults,
    /// Log output.
    pub logging: LoggingSettings,
}

impl DanmakuSettings {
    /// Reject values the server cannot start with.
    ///
    /// Display numbers are not checked here; they are clamped instead.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be positive".into(),
            ));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be positive".into(),
            ));
        }
        if self.server.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxMessageSize must be positive".into(),
            ));
        }
        if self.server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalSecs must be positive".into(),
            ));
        }
        if self.server.heartbeat_timeout_secs < self.server.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatTimeoutSecs must not be shorter than the interval".into(),
            ));
        }
        if self.upload.max_bytes == 0 {
            return Err(SettingsError::InvalidValue("upload.maxBytes must be positive".into()));
        }
        Ok(())
    }
}
