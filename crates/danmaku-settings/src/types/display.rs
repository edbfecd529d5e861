//! Initial display state and admin credentials.

use std::fmt;

use danmaku_core::{AdminGate, BannedWords, DisplaySettings};
use serde::{Deserialize, Serialize};

/// Display values the relay starts with.
///
/// Out-of-range numbers are accepted here and clamped when converted with
/// [`DisplayDefaults::to_display_settings`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplayDefaults {
    /// Initial scroll speed.
    pub barrage_speed: u32,
    /// Initial density.
    pub barrage_density: u32,
    /// Initial lane count.
    pub lanes: u32,
    /// Words banned from the start.
    pub banned_words: Vec<String>,
}

impl Default for DisplayDefaults {
    fn default() -> Self {
        let core = DisplaySettings::default();
        Self {
            barrage_speed: core.barrage_speed,
            barrage_density: core.barrage_density,
            lanes: core.lanes,
            banned_words: Vec::new(),
        }
    }
}

impl DisplayDefaults {
    /// Clamped display settings with no background.
    pub fn to_display_settings(&self) -> DisplaySettings {
        DisplaySettings {
            barrage_speed: self.barrage_speed,
            barrage_density: self.barrage_density,
            lanes: self.lanes,
            ..DisplaySettings::default()
        }
        .clamped()
    }

    /// Initial blocklist, trimmed and de-duplicated.
    pub fn banned_words(&self) -> BannedWords {
        self.banned_words.iter().collect()
    }
}

/// Admin credentials.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminSettings {
    /// Password compared exactly on login. Empty disables admin access.
    pub password: String,
}

impl AdminSettings {
    /// Whether a password is configured.
    pub fn is_enabled(&self) -> bool {
        !self.password.is_empty()
    }

    /// Build the gate used by the relay.
    pub fn gate(&self) -> AdminGate {
        AdminGate::new(self.password.clone())
    }
}

impl fmt::Debug for AdminSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSettings")
            .field("password", &if self.is_enabled() { "[REDACTED]" } else { "" })
            .finish()
    }
}
