//! User-facing collaborators injected into the authentication core.

use crate::errors::Result;
use crate::types::{AppIdentity, UserAccount};

/// Receives status text meant for the user (device code instructions,
/// "Logged in as ..." notices).
pub trait MessageSink: Send + Sync {
    /// Show one message.
    fn show(&self, message: &str);
}

/// Asks the user which cached identity to act as.
#[cfg_attr(test, mockall::automock)]
pub trait IdentityPrompt: Send + Sync {
    /// Return the chosen username or application client id.
    fn choose_identity(&self, users: &[UserAccount], apps: &[AppIdentity]) -> Result<String>;
}
