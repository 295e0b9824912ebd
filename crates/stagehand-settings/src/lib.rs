//! # stagehand-settings
//!
//! Configuration management with layered sources for the stagehand worker.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`WorkerSettings::default()`]
//! 2. **Settings file**: `~/.stagehand/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `STAGEHAND_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use stagehand_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("listening on port {}", settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
