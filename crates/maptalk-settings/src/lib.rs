//! # maptalk-settings
//!
//! Layered configuration for the maptalk relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **User file**: `~/.maptalk/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PORT` and `MAPTALK_*` overrides
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_path, load_settings_with_env, settings_path,
};
pub use types::*;
