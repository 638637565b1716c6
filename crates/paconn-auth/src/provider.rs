//! Common capability surface of the two token managers.

use async_trait::async_trait;

use crate::confidential::AppTokenManager;
use crate::errors::Result;
use crate::public::UserTokenManager;
use crate::types::{AccessToken, CachedIdentity};

/// Which manager backs a [`CredentialProvider`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    /// Delegated user credentials.
    User,
    /// Application (client credential) credentials.
    Application,
}

/// Something that can sign in and hand out bearer tokens.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Which kind of identity this provider serves.
    fn kind(&self) -> ProviderKind;

    /// Run the provider's login flow.
    async fn authenticate(&self) -> Result<AccessToken>;

    /// Token for the configured identity, without user interaction.
    async fn get_token(&self) -> Result<AccessToken>;

    /// Identities cached by this provider.
    fn list_identities(&self) -> Vec<CachedIdentity>;
}

#[async_trait]
impl CredentialProvider for UserTokenManager {
    fn kind(&self) -> ProviderKind {
        ProviderKind::User
    }

    async fn authenticate(&self) -> Result<AccessToken> {
        UserTokenManager::authenticate(self).await
    }

    async fn get_token(&self) -> Result<AccessToken> {
        UserTokenManager::get_token(self).await
    }

    fn list_identities(&self) -> Vec<CachedIdentity> {
        self.list_accounts()
            .into_iter()
            .map(CachedIdentity::User)
            .collect()
    }
}

#[async_trait]
impl CredentialProvider for AppTokenManager {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Application
    }

    async fn authenticate(&self) -> Result<AccessToken> {
        self.authenticate_application().await
    }

    async fn get_token(&self) -> Result<AccessToken> {
        AppTokenManager::get_token(self).await
    }

    fn list_identities(&self) -> Vec<CachedIdentity> {
        self.list_apps().into_iter().map(CachedIdentity::App).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
