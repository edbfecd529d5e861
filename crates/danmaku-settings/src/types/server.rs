//! Network, upload and logging settings.

use serde::{Deserialize, Serialize};

/// HTTP and WebSocket listener settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Interval between server pings, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a connection after this long without a pong, in seconds.
    pub heartbeat_timeout_secs: u64,
    /// Largest accepted inbound WebSocket frame, in bytes.
    pub max_message_size: usize,
    /// Outbound queue length per connection before events are dropped.
    pub send_queue_capacity: usize,
    /// Directory served at `/` (viewer and admin pages).
    pub static_dir: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_connections: 1000,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
            static_dir: "public".to_string(),
        }
    }
}

/// Background media upload settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadSettings {
    /// Directory uploaded files are written to and served from at `/uploads`.
    pub dir: String,
    /// Largest accepted request body for `/upload`, in bytes.
    pub max_bytes: usize,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            dir: "uploads".to_string(),
            max_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
