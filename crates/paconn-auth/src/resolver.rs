//! Active identity resolution.
//!
//! Decides which cached identity a command acts as. A configured account
//! always wins; otherwise a lone candidate is picked automatically and the
//! user is prompted only when the choice is ambiguous.

use std::fmt;

use paconn_settings::Settings;

use crate::errors::{AuthError, Result};
use crate::interaction::IdentityPrompt;
use crate::types::{AppIdentity, UserAccount};

/// An identity to act as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identity {
    /// Username of a delegated account.
    User(String),
    /// Application (client) id.
    App(String),
}

impl Identity {
    /// Classify a configured value: UUIDs are application client ids,
    /// anything else is a username.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if uuid::Uuid::parse_str(value).is_ok() {
            Self::App(value.to_string())
        } else {
            Self::User(value.to_string())
        }
    }

    /// Username or client id.
    pub fn as_str(&self) -> &str {
        match self {
            Self::User(name) | Self::App(name) => name,
        }
    }

    /// Whether this is an application identity.
    pub fn is_app(&self) -> bool {
        matches!(self, Self::App(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(name) => write!(f, "user {name}"),
            Self::App(id) => write!(f, "app {id}"),
        }
    }
}

/// How the identity was chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentitySource {
    /// `settings.account` named it.
    Configured,
    /// It was the only cached identity.
    OnlyCandidate,
    /// The user picked it.
    Prompted,
}

/// Result of [`resolve`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// The identity to act as.
    pub identity: Identity,
    /// How it was chosen.
    pub source: IdentitySource,
}

/// Pick the identity the current command acts as.
pub fn resolve(
    settings: &Settings,
    users: &[UserAccount],
    apps: &[AppIdentity],
    prompt: &dyn IdentityPrompt,
) -> Result<ResolvedIdentity> {
    let (identity, source) = if let Some(account) = &settings.account {
        (Identity::parse(account), IdentitySource::Configured)
    } else {
        match (users, apps) {
            ([], []) => return Err(AuthError::NotLoggedIn),
            ([user], []) => (
                Identity::User(user.username.clone()),
                IdentitySource::OnlyCandidate,
            ),
            ([], [app]) => (
                Identity::App(app.client_id.clone()),
                IdentitySource::OnlyCandidate,
            ),
            _ => {
                let choice = prompt.choose_identity(users, apps)?;
                (Identity::parse(&choice), IdentitySource::Prompted)
            }
        }
    };

    tracing::debug!(%identity, ?source, "resolved active identity");
    Ok(ResolvedIdentity { identity, source })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
