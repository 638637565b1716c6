//! # paconn-settings
//!
//! Authentication settings for the paconn CLI.
//!
//! Settings are resolved from four layers (in priority order, lowest first):
//! 1. **Compiled defaults**: public client id, `common` tenant, Power Apps scope
//! 2. **Settings file**: `settings.json` passed with `--settings`
//! 3. **Environment variables**: `PACONN_*` overrides
//! 4. **Command line**: flags of the running command (highest priority)
//!
//! Each layer is a [`SettingsLayer`] of optional values; [`Settings::from_layer`]
//! applies defaults and derives the authority URL and scope list.
//!
//! The crate also resolves the per-user config directory that holds the
//! token caches ([`config_dir`]).

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod paths;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{env_layer, env_layer_from, load_layer_from_path, load_settings};
pub use paths::{CONFIG_DIR_ENV, config_dir};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
