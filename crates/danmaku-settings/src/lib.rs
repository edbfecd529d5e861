//! # danmaku-settings
//!
//! Layered configuration for the danmaku relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`DanmakuSettings::default()`]
//! 2. **User file**: `~/.danmaku/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `DANMAKU_*` overrides
//!
//! The binary applies command-line flags last. Settings are read once at
//! startup and never reloaded.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_is_under_home_dir() {
        let path = settings_path();
        assert!(path.ends_with(".danmaku/settings.json"));
    }

    #[test]
    fn re_exports_work() {
        let settings = DanmakuSettings::default();
        assert_eq!(settings.display.lanes, 10);
        assert!(!settings.admin.is_enabled());
    }
}
