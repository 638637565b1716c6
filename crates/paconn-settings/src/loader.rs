//! Settings loading: settings file, environment overrides, command line.

use std::path::Path;

use crate::errors::{Result, SettingsError};
use crate::types::{Settings, SettingsLayer};

/// Load and resolve settings.
///
/// `path` is the optional `--settings` file; when given it must exist.
/// Environment overrides are applied over the file and `cli` over both.
pub fn load_settings(path: Option<&Path>, cli: SettingsLayer) -> Result<Settings> {
    let mut layer = match path {
        Some(path) => load_layer_from_path(path)?,
        None => SettingsLayer::default(),
    };
    layer.overlay(env_layer());
    layer.overlay(cli);

    let settings = Settings::from_layer(layer);
    tracing::debug!(?settings, "settings resolved");
    Ok(settings)
}

/// Read a settings file into a layer.
pub fn load_layer_from_path(path: &Path) -> Result<SettingsLayer> {
    if !path.exists() {
        return Err(SettingsError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "loaded settings file");
    serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Build a layer from `PACONN_*` environment variables.
pub fn env_layer() -> SettingsLayer {
    env_layer_from(|key| std::env::var(key).ok())
}

/// Build a layer from an arbitrary variable lookup.
pub fn env_layer_from(lookup: impl Fn(&str) -> Option<String>) -> SettingsLayer {
    let flag = |key: &str| {
        lookup(key).and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            other => {
                tracing::warn!(key, value = other, "ignoring non-boolean environment value");
                None
            }
        })
    };

    SettingsLayer {
        client_id: lookup("PACONN_CLIENT_ID"),
        client_secret: lookup("PACONN_CLIENT_SECRET"),
        tenant: lookup("PACONN_TENANT"),
        authority_url: lookup("PACONN_AUTHORITY_URL"),
        resource: lookup("PACONN_RESOURCE"),
        scopes: lookup("PACONN_SCOPES"),
        username: lookup("PACONN_USERNAME"),
        account: lookup("PACONN_ACCOUNT"),
        interactive_login: flag("PACONN_INTERACTIVE"),
        disable_broker_on_windows: flag("PACONN_DISABLE_BROKER"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
