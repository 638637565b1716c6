//! Command-level orchestration: login, logout, identity routing.

use std::sync::Arc;

use paconn_settings::Settings;

use crate::cache::{CacheStore, Namespace};
use crate::client::IdentityClient;
use crate::confidential::AppTokenManager;
use crate::errors::Result;
use crate::interaction::{IdentityPrompt, MessageSink};
use crate::provider::{CredentialProvider, ProviderKind};
use crate::public::UserTokenManager;
use crate::resolver::{self, Identity, IdentitySource, ResolvedIdentity};
use crate::types::{AccessToken, AppIdentity, CachedIdentity, UserAccount};

/// Outcome of [`Authenticator::login`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    /// A user login ran (or was skipped because a valid session exists).
    User {
        /// Whether the flow was skipped.
        already_authenticated: bool,
        /// Cached accounts after the login.
        accounts: Vec<UserAccount>,
    },
    /// An application login ran.
    Application {
        /// The application's client id.
        client_id: String,
    },
}

/// Entry point for commands that need credentials.
pub struct Authenticator {
    store: Arc<CacheStore>,
    client: Arc<dyn IdentityClient>,
    display: Arc<dyn MessageSink>,
    prompt: Arc<dyn IdentityPrompt>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Wire the store and collaborators together.
    pub fn new(
        store: Arc<CacheStore>,
        client: Arc<dyn IdentityClient>,
        display: Arc<dyn MessageSink>,
        prompt: Arc<dyn IdentityPrompt>,
    ) -> Self {
        Self {
            store,
            client,
            display,
            prompt,
        }
    }

    fn user_manager(&self, settings: &Settings) -> Result<UserTokenManager> {
        UserTokenManager::new(
            settings,
            &self.store,
            Arc::clone(&self.client),
            Arc::clone(&self.display),
        )
    }

    fn app_manager(&self, settings: &Settings) -> Result<AppTokenManager> {
        AppTokenManager::new(settings, &self.store, Arc::clone(&self.client))
    }

    /// Log in: application flow when a client secret is configured, user
    /// flow otherwise. A user login is skipped when the configured user can
    /// already get a token silently, unless `force` is set.
    #[tracing::instrument(skip_all, fields(application = settings.is_application(), force = force))]
    pub async fn login(&self, settings: &Settings, force: bool) -> Result<LoginOutcome> {
        if settings.is_application() {
            let manager = self.app_manager(settings)?;
            let client_id = manager.client_id().to_string();
            sign_in(&manager).await?;
            return Ok(LoginOutcome::Application { client_id });
        }

        let manager = self.user_manager(settings)?;
        let already_authenticated = !force && manager.is_authenticated().await;
        if already_authenticated {
            tracing::info!("existing session is valid; skipping login");
        } else {
            sign_in(&manager).await?;
        }
        Ok(LoginOutcome::User {
            already_authenticated,
            accounts: manager.list_accounts(),
        })
    }

    /// Forget every cached credential in both namespaces.
    pub fn logout(&self) -> Result<()> {
        self.store.clear_caches(Namespace::Public)?;
        self.store.clear_caches(Namespace::Confidential)?;
        tracing::info!("cleared token caches");
        Ok(())
    }

    /// Cached users and applications.
    pub fn cached_identities(
        &self,
        settings: &Settings,
    ) -> Result<(Vec<UserAccount>, Vec<AppIdentity>)> {
        let providers: [Box<dyn CredentialProvider>; 2] = [
            Box::new(self.user_manager(settings)?),
            Box::new(self.app_manager(settings)?),
        ];
        let mut users = Vec::new();
        let mut apps = Vec::new();
        for identity in providers.iter().flat_map(|p| p.list_identities()) {
            match identity {
                CachedIdentity::User(user) => users.push(user),
                CachedIdentity::App(app) => apps.push(app),
            }
        }
        Ok((users, apps))
    }

    /// Resolve the identity the command acts as and announce it.
    pub fn resolve_identity(&self, settings: &Settings) -> Result<ResolvedIdentity> {
        let (users, apps) = self.cached_identities(settings)?;
        let resolved = resolver::resolve(settings, &users, &apps, self.prompt.as_ref())?;
        if resolved.source != IdentitySource::Configured {
            self.display
                .show(&format!("Logged in as {}", resolved.identity));
        }
        Ok(resolved)
    }

    /// Provider serving `identity`: application ids route to the app
    /// manager, usernames to the user manager.
    pub fn provider_for(
        &self,
        settings: &Settings,
        identity: &Identity,
    ) -> Result<Box<dyn CredentialProvider>> {
        let settings = settings.with_account(identity.as_str());
        Ok(match identity {
            Identity::App(_) => Box::new(self.app_manager(&settings)?),
            Identity::User(_) => Box::new(self.user_manager(&settings)?),
        })
    }

    /// Token for the resolved identity.
    pub async fn credentials(&self, settings: &Settings) -> Result<AccessToken> {
        let resolved = self.resolve_identity(settings)?;
        self.provider_for(settings, &resolved.identity)?
            .get_token()
            .await
    }
}

async fn sign_in(provider: &dyn CredentialProvider) -> Result<()> {
    let kind = provider.kind();
    let token = provider.authenticate().await?;
    tracing::info!(
        application = kind == ProviderKind::Application,
        account = token.account.as_deref().unwrap_or_default(),
        "login complete"
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
