//! # actready-settings
//!
//! Layered configuration, in priority order:
//! 1. **Compiled defaults**: [`Settings::default()`]
//! 2. **User file**: `~/.actready/settings.json` or an explicit path (deep-merged)
//! 3. **Environment variables**: `ACTREADY_*` and `OPENAI_*` overrides
//!
//! Settings are loaded once by the binary and passed down explicitly; there is
//! no global instance.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    api_key_from_env, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
