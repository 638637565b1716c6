//! Identity and token types exposed to calling commands.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A validated bearer token.
///
/// Handed to REST collaborators and discarded; the token cache is the
/// persisted form.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Bearer string.
    pub secret: String,
    /// Token type reported by the provider (`Bearer`).
    pub token_type: String,
    /// Absolute expiry.
    pub expires_on: DateTime<Utc>,
    /// Username or client id the token was issued for, when known.
    pub account: Option<String>,
}

impl AccessToken {
    /// Value for an `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.secret)
    }

    /// Same token, attributed to `account`.
    #[must_use]
    pub fn for_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"***")
            .field("token_type", &self.token_type)
            .field("expires_on", &self.expires_on)
            .field("account", &self.account)
            .finish()
    }
}

/// A user account known to the public token cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Sign-in name (UPN or email).
    pub username: String,
    /// Opaque home account id (`<object id>.<tenant id>`).
    pub home_account_id: String,
    /// Tenant the account was signed into.
    pub realm: String,
}

/// An application identity known to the confidential token cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    /// Application (client) id, UUID shaped.
    pub client_id: String,
}

/// Either kind of cached identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CachedIdentity {
    /// Delegated user account.
    User(UserAccount),
    /// Application (client credential) identity.
    App(AppIdentity),
}
