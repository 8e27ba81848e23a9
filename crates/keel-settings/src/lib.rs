//! # keel-settings
//!
//! Layered configuration for the Keel relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`KeelSettings::default()`]
//! 2. **Settings file**: `~/.keel/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `KEEL_*` overrides (highest priority)
//!
//! Command-line flags applied by the binary sit above all three.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path,
    load_settings_with_env, settings_path, validate,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_is_under_dot_keel() {
        let path = settings_path();
        assert!(path.ends_with(".keel/settings.json"));
    }

    #[test]
    fn defaults_validate() {
        assert!(validate(&KeelSettings::default()).is_ok());
    }
}
