//! Display settings and the store that applies admin updates to them.
//!
//! Every numeric field is clamped into its range on the way in, so a
//! [`DisplaySettings`] held by a [`SettingsStore`] is always in range.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Valid range for `barrageSpeed`.
pub const SPEED_RANGE: RangeInclusive<u32> = 1..=20;
/// Valid range for `barrageDensity`.
pub const DENSITY_RANGE: RangeInclusive<u32> = 1..=10;
/// Valid range for `lanes`.
pub const LANES_RANGE: RangeInclusive<u32> = 4..=20;

/// Color applied to messages sent without one.
pub const DEFAULT_COLOR: &str = "#ffffff";

// ─────────────────────────────────────────────────────────────────────────────
// Background
// ─────────────────────────────────────────────────────────────────────────────

/// Shared background shown behind the scrolling messages.
///
/// On the wire this is always `{"type": "none"|"image"|"video", "url": "..."}`,
/// with an empty `url` for [`Background::None`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "BackgroundWire", from = "BackgroundWire")]
pub enum Background {
    /// No background media.
    #[default]
    None,
    /// A still image at `url`.
    Image(String),
    /// A video at `url`.
    Video(String),
}

impl Background {
    /// Wire name of the background kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Image(_) => "image",
            Self::Video(_) => "video",
        }
    }

    /// URL of the media, empty for [`Background::None`].
    pub fn url(&self) -> &str {
        match self {
            Self::None => "",
            Self::Image(url) | Self::Video(url) => url,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct BackgroundWire {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    url: String,
}

impl From<Background> for BackgroundWire {
    fn from(bg: Background) -> Self {
        Self {
            kind: bg.kind().to_owned(),
            url: bg.url().to_owned(),
        }
    }
}

impl From<BackgroundWire> for Background {
    fn from(wire: BackgroundWire) -> Self {
        let descriptor = BackgroundDescriptor {
            kind: wire.kind,
            url: Some(wire.url),
        };
        descriptor.validate().unwrap_or_default()
    }
}

/// Unvalidated background request as sent by an admin client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundDescriptor {
    /// Requested kind: `none`, `image` or `video`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Media URL, required for `image` and `video`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl BackgroundDescriptor {
    /// Convert into a [`Background`], or `None` if the request must be ignored.
    ///
    /// `none` is always valid. `image` and `video` need a non-blank URL.
    /// Any other kind is rejected.
    pub fn validate(&self) -> Option<Background> {
        let url = self.url.as_deref().map(str::trim).unwrap_or_default();
        match self.kind.as_str() {
            "none" => Some(Background::None),
            "image" if !url.is_empty() => Some(Background::Image(url.to_owned())),
            "video" if !url.is_empty() => Some(Background::Video(url.to_owned())),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DisplaySettings
// ─────────────────────────────────────────────────────────────────────────────

/// The display configuration shared by every viewer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySettings {
    /// Scroll speed, 1 (slowest) to 20.
    pub barrage_speed: u32,
    /// How densely messages are packed, 1 to 10.
    pub barrage_density: u32,
    /// Number of horizontal lanes, 4 to 20.
    pub lanes: u32,
    /// Shared background media.
    pub background: Background,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            barrage_speed: 5,
            barrage_density: 5,
            lanes: 10,
            background: Background::None,
        }
    }
}

impl DisplaySettings {
    /// Return a copy with every numeric field forced into its range.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            barrage_speed: clamp_u32(self.barrage_speed, &SPEED_RANGE),
            barrage_density: clamp_u32(self.barrage_density, &DENSITY_RANGE),
            lanes: clamp_u32(self.lanes, &LANES_RANGE),
            background: self.background,
        }
    }
}

fn clamp_u32(value: u32, range: &RangeInclusive<u32>) -> u32 {
    value.clamp(*range.start(), *range.end())
}

/// Read an integer JSON value and clamp it into `range`.
///
/// Non-integer values (strings, floats, booleans, null) yield `None` so the
/// caller can ignore them. Integers too large for `i64` clamp to the maximum.
fn clamp_json(value: &Value, range: &RangeInclusive<u32>) -> Option<u32> {
    let (min, max) = (*range.start(), *range.end());
    if let Some(n) = value.as_i64() {
        let clamped = n.clamp(i64::from(min), i64::from(max));
        return u32::try_from(clamped).ok();
    }
    value.as_u64().map(|_| max)
}

// ─────────────────────────────────────────────────────────────────────────────
// SettingsStore
// ─────────────────────────────────────────────────────────────────────────────

/// Holds the current [`DisplaySettings`] and applies validated changes.
#[derive(Clone, Debug, Default)]
pub struct SettingsStore {
    current: DisplaySettings,
}

impl SettingsStore {
    /// Create a store, clamping the initial values.
    pub fn new(initial: DisplaySettings) -> Self {
        Self {
            current: initial.clamped(),
        }
    }

    /// Snapshot of the current settings.
    pub fn get(&self) -> DisplaySettings {
        self.current.clone()
    }

    /// Borrow the current settings.
    pub fn current(&self) -> &DisplaySettings {
        &self.current
    }

    /// Apply a partial update from an admin client.
    ///
    /// Recognized keys are `barrageSpeed`, `barrageDensity` and `lanes`.
    /// Each one present with an integer value is clamped and stored; other
    /// keys and wrong-typed values are ignored. A non-object patch changes
    /// nothing. Returns the resulting settings.
    pub fn apply_partial_update(&mut self, patch: &Value) -> DisplaySettings {
        let Some(fields) = patch.as_object() else {
            return self.get();
        };

        if let Some(v) = fields.get("barrageSpeed").and_then(|v| clamp_json(v, &SPEED_RANGE)) {
            self.current.barrage_speed = v;
        }
        if let Some(v) = fields
            .get("barrageDensity")
            .and_then(|v| clamp_json(v, &DENSITY_RANGE))
        {
            self.current.barrage_density = v;
        }
        if let Some(v) = fields.get("lanes").and_then(|v| clamp_json(v, &LANES_RANGE)) {
            self.current.lanes = v;
        }

        self.get()
    }

    /// Replace the background if `descriptor` is valid.
    ///
    /// Returns `false` (and leaves the background alone) when the request
    /// has an unknown kind or is missing its URL.
    pub fn set_background(&mut self, descriptor: &BackgroundDescriptor) -> bool {
        match descriptor.validate() {
            Some(bg) => {
                self.current.background = bg;
                true
            }
            None => false,
        }
    }
}
