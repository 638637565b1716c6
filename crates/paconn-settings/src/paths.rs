//! Config directory resolution.

use std::path::PathBuf;

use crate::errors::{Result, SettingsError};

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "PACONN_CONFIG_DIR";

/// Directory holding the token and HTTP caches.
///
/// `$PACONN_CONFIG_DIR` when set, else `<platform config dir>/paconn`.
/// The directory is not created here; the cache store creates it on first write.
pub fn config_dir() -> Result<PathBuf> {
    resolve_config_dir(std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from), dirs::config_dir())
}

fn resolve_config_dir(explicit: Option<PathBuf>, platform: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit.filter(|d| !d.as_os_str().is_empty()) {
        return Ok(dir);
    }
    platform
        .map(|dir| dir.join("paconn"))
        .ok_or(SettingsError::NoConfigDir)
}
