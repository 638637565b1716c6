//! Authentication error types.

use std::path::PathBuf;

/// Errors surfaced by the authentication core.
///
/// The first group is the user-facing taxonomy; the CLI prints the
/// message and exits non-zero. The second group carries infrastructure
/// failures (I/O, transport, malformed protocol payloads).
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The provider returned nothing usable.
    #[error("Access token invalid. Please login again.")]
    InvalidToken,

    /// The provider requires a confidential client bound to a tenant.
    #[error("Need client secret and tenant to login. Please login again.")]
    TenantRequired,

    /// The provider returned an OAuth error.
    #[error("{}", provider_message(.error, .description.as_deref()))]
    ProviderError {
        /// OAuth `error` field.
        error: String,
        /// OAuth `error_description` field.
        description: Option<String>,
    },

    /// A response of unrecognized shape.
    #[error("Please login again.")]
    Unknown,

    /// No cached user account or application identity exists.
    #[error("No logged in accounts. Please login first.")]
    NotLoggedIn,

    /// A cached-token operation ran without an account to act as.
    #[error("Expected an account to be configured. Use --account or login first.")]
    NoAccountConfigured,

    /// The configured account is not in the token cache.
    #[error("Unknown account {name}. Please login again.")]
    UnknownAccount {
        /// The configured account name.
        name: String,
    },

    /// The provider did not complete the flow in time.
    #[error("Timed out waiting for authentication to complete. Please login again.")]
    Timeout,

    /// The token cache file exists but cannot be decoded.
    #[error(
        "Token cache {} is unreadable ({reason}). Please run `paconn logout` and login again.",
        .path.display()
    )]
    CorruptTokenCache {
        /// Cache file path.
        path: PathBuf,
        /// Decoder error.
        reason: String,
    },

    /// Cache file I/O failure.
    #[error("cache I/O error at {}: {source}", .path.display())]
    Io {
        /// Affected file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// HTTP transport failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed or unexpected protocol payload (discovery, device code, callback).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The identity prompt could not produce a choice.
    #[error("account selection failed: {0}")]
    Prompt(String),
}

fn provider_message(error: &str, description: Option<&str>) -> String {
    match description {
        Some(d) if !d.is_empty() => format!("{error} {d}"),
        _ => error.to_string(),
    }
}

/// Convenience alias for authentication results.
pub type Result<T> = std::result::Result<T, AuthError>;
