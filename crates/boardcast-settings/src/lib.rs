//! # boardcast-settings
//!
//! Configuration for the boardcast server, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`BoardcastSettings::default()`]
//! 2. **Settings file**: `~/.boardcast/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `BOARDCAST_*` overrides (highest priority)
//!
//! Settings are loaded once by the binary and handed down explicitly; there
//! is no global settings instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
