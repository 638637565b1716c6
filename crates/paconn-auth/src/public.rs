//! Delegated (user) token management over the `public` cache namespace.

use std::sync::Arc;

use paconn_settings::Settings;
use serde_json::Value;

use crate::application::{ClientApplication, observe};
use crate::authority::Authority;
use crate::cache::{CacheStore, Namespace};
use crate::client::{IdentityClient, InteractiveRequest};
use crate::errors::{AuthError, Result};
use crate::interaction::MessageSink;
use crate::types::{AccessToken, UserAccount};
use crate::validator::validate;

/// Public-client token manager: device code and browser sign-in, silent
/// acquisition from cached tokens.
pub struct UserTokenManager {
    settings: Settings,
    app: ClientApplication,
    display: Arc<dyn MessageSink>,
}

impl std::fmt::Debug for UserTokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserTokenManager")
            .field("settings", &self.settings)
            .field("app", &self.app)
            .finish_non_exhaustive()
    }
}

impl UserTokenManager {
    /// Manager for `settings` over the store's `public` caches.
    pub fn new(
        settings: &Settings,
        store: &CacheStore,
        client: Arc<dyn IdentityClient>,
        display: Arc<dyn MessageSink>,
    ) -> Result<Self> {
        let authority = Authority::parse(&settings.authority_url)?;
        let app = ClientApplication::new(
            settings.client_id.clone(),
            authority,
            client,
            store.token_cache(Namespace::Public)?,
            store.http_cache(Namespace::Public),
        );
        Ok(Self {
            settings: settings.clone(),
            app,
            display,
        })
    }

    /// Whether a cached account matching the configured username can
    /// silently obtain a valid token for the configured scopes.
    ///
    /// Without a matching cached account this answers `false` without any
    /// network traffic.
    pub async fn is_authenticated(&self) -> bool {
        let accounts = self.app.accounts(self.settings.username.as_deref());
        let Some(account) = accounts.first() else {
            tracing::debug!(username = ?self.settings.username, "no matching cached account");
            return false;
        };
        match self.acquire_silent(account).await {
            Ok(raw) => validate(raw.as_ref()).is_ok(),
            Err(e) => {
                tracing::debug!(error = %e, "silent acquisition failed");
                false
            }
        }
    }

    /// Sign in with the device code flow.
    #[tracing::instrument(skip_all, fields(client_id = %self.app.client_id()))]
    pub async fn authenticate_with_device_code(&self) -> Result<AccessToken> {
        let result = async {
            let metadata = self.app.metadata().await?;
            let flow = self
                .app
                .client()
                .start_device_flow(&metadata, self.app.client_id(), &self.settings.scopes)
                .await?;
            self.display.show(&flow.message);
            let raw = self
                .app
                .client()
                .complete_device_flow(&metadata, self.app.client_id(), &flow)
                .await?;
            self.finish_sign_in(&raw)
        }
        .await;
        observe("device_code", result)
    }

    /// Sign in through the browser (authorization code + PKCE).
    #[tracing::instrument(skip_all, fields(client_id = %self.app.client_id()))]
    pub async fn authenticate_interactive(&self) -> Result<AccessToken> {
        if self.settings.disable_broker_on_windows {
            tracing::debug!("account broker disabled by settings");
        }
        let result = async {
            let metadata = self.app.metadata().await?;
            let request = InteractiveRequest {
                client_id: self.app.client_id().to_string(),
                scopes: self.settings.scopes.clone(),
                domain_hint: Some(self.settings.tenant.clone()),
                login_hint: self.settings.username.clone(),
            };
            self.display
                .show("Opening a browser window to sign in. Complete the sign-in there to continue.");
            let raw = self
                .app
                .client()
                .acquire_interactive(&metadata, &request)
                .await?;
            self.finish_sign_in(&raw)
        }
        .await;
        observe("interactive", result)
    }

    /// Sign in with the flow the settings select.
    pub async fn authenticate(&self) -> Result<AccessToken> {
        if self.settings.interactive_login {
            self.authenticate_interactive().await
        } else {
            self.authenticate_with_device_code().await
        }
    }

    /// All cached user accounts.
    pub fn list_accounts(&self) -> Vec<UserAccount> {
        self.app.accounts(None)
    }

    /// Token for the configured account, silently.
    pub async fn get_token(&self) -> Result<AccessToken> {
        let name = self
            .settings
            .account
            .as_deref()
            .ok_or(AuthError::NoAccountConfigured)?;
        let accounts = self.app.accounts(Some(name));
        let account = accounts.first().ok_or_else(|| AuthError::UnknownAccount {
            name: name.to_string(),
        })?;
        let result = async {
            let raw = self.acquire_silent(account).await?;
            validate(raw.as_ref()).map(|t| t.for_account(account.username.clone()))
        }
        .await;
        observe("silent", result)
    }

    fn finish_sign_in(&self, raw: &Value) -> Result<AccessToken> {
        let token = validate(Some(raw))?;
        Ok(
            match self.app.record_user_grant(raw, &self.settings.scopes, None) {
                Some(account) => token.for_account(account.username),
                None => token,
            },
        )
    }

    /// Cached token, else refresh-token redemption, else nothing.
    async fn acquire_silent(&self, account: &UserAccount) -> Result<Option<Value>> {
        let scopes = &self.settings.scopes;
        if let Some(raw) = self.app.cached_user_token(account, scopes) {
            return Ok(Some(raw));
        }
        let Some(refresh_token) = self.app.refresh_token(account) else {
            tracing::debug!(username = %account.username, "no refresh token cached");
            return Ok(None);
        };

        let metadata = self.app.metadata().await?;
        let raw = self
            .app
            .client()
            .redeem_refresh_token(&metadata, self.app.client_id(), &refresh_token, scopes)
            .await?;
        let _ = self.app.record_user_grant(&raw, scopes, Some(account));
        Ok(Some(raw))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
