//! Settings error types.

use std::path::PathBuf;

/// Errors raised while resolving settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// An explicitly requested settings file does not exist.
    #[error("settings file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The settings file exists but could not be read.
    #[error("failed to read settings file {}: {source}", .path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON (or has wrongly-typed fields).
    #[error("invalid settings file {}: {source}", .path.display())]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Neither `PACONN_CONFIG_DIR` nor a platform config directory is available.
    #[error("no configuration directory available; set PACONN_CONFIG_DIR")]
    NoConfigDir,
}

/// Convenience alias for settings results.
pub type Result<T> = std::result::Result<T, SettingsError>;
