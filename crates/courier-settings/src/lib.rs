//! # courier-settings
//!
//! Layered configuration for the Courier relay.
//!
//! Settings are resolved from three layers (in priority order):
//! 1. **Compiled defaults**: [`CourierSettings::default()`]
//! 2. **User file**: `~/.courier/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `COURIER_*` overrides (highest priority)
//!
//! ```no_run
//! let settings = courier_settings::load_settings().unwrap_or_default();
//! println!("listening on {}:{}", settings.server.host, settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{CourierSettings, LogFormat, LoggingSettings, ServerSettings};
