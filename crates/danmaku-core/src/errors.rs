//! Error types for frame decoding and the relay channel.
//!
//! Domain rejections (empty text, banned content, unauthorized admin calls)
//! are not errors: they are reported as [`crate::Outcome`] values and, where
//! the protocol says so, as sender-only notices.

use thiserror::Error;

/// Failure to turn an inbound frame into a [`crate::ClientEvent`].
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON or did not match any known event.
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] serde_json::Error),
    /// A binary frame did not contain UTF-8 text.
    #[error("binary frame is not valid UTF-8")]
    NotUtf8,
}

/// Failure to reach the task that owns the relay state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    /// The relay task has stopped and no longer accepts commands.
    #[error("relay is not running")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_frame_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err = ProtocolError::from(json_err);
        assert!(err.to_string().starts_with("invalid frame:"));
    }

    #[test]
    fn not_utf8_display() {
        assert_eq!(ProtocolError::NotUtf8.to_string(), "binary frame is not valid UTF-8");
    }

    #[test]
    fn relay_closed_display() {
        assert_eq!(RelayError::Closed.to_string(), "relay is not running");
    }
}
