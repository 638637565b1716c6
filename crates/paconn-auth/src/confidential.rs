//! Application (client credential) token management over the
//! `confidential` cache namespace.

use std::sync::Arc;

use paconn_settings::Settings;

use crate::application::{ClientApplication, observe};
use crate::authority::Authority;
use crate::cache::{CacheStore, Namespace};
use crate::client::IdentityClient;
use crate::errors::Result;
use crate::types::{AccessToken, AppIdentity};
use crate::validator::validate;

/// Confidential-client token manager.
///
/// Tokens are acquired under the configured tenant and then also filed
/// under the `common` realm, so that later commands that only know the
/// client id (and default to the `common` authority) still find them.
#[derive(Debug)]
pub struct AppTokenManager {
    settings: Settings,
    app: ClientApplication,
}

impl AppTokenManager {
    /// Manager for `settings` over the store's `confidential` caches.
    ///
    /// The client id is `settings.account` when set, else `settings.client_id`.
    pub fn new(
        settings: &Settings,
        store: &CacheStore,
        client: Arc<dyn IdentityClient>,
    ) -> Result<Self> {
        let client_id = settings
            .account
            .clone()
            .unwrap_or_else(|| settings.client_id.clone());
        let app = ClientApplication::new(
            client_id,
            Authority::parse(&settings.authority_url)?,
            client,
            store.token_cache(Namespace::Confidential)?,
            store.http_cache(Namespace::Confidential),
        );
        Ok(Self {
            settings: settings.clone(),
            app,
        })
    }

    /// Application (client) id this manager acts as.
    pub fn client_id(&self) -> &str {
        self.app.client_id()
    }

    /// Cached token for the configured scopes, else a client credential
    /// acquisition when a secret is configured.
    #[tracing::instrument(skip_all, fields(client_id = %self.app.client_id()))]
    pub async fn get_token(&self) -> Result<AccessToken> {
        let scopes = &self.settings.scopes;
        let result = async {
            let raw = match self.app.cached_app_token(scopes) {
                Some(raw) => Some(raw),
                None => match &self.settings.client_secret {
                    Some(secret) => {
                        let metadata = self.app.metadata().await?;
                        let raw = self
                            .app
                            .client()
                            .acquire_for_client(&metadata, self.app.client_id(), secret, scopes)
                            .await?;
                        let _ = self.app.record_app_grant(&raw, scopes);
                        Some(raw)
                    }
                    None => {
                        tracing::debug!("no cached app token and no client secret");
                        None
                    }
                },
            };
            validate(raw.as_ref()).map(|t| t.for_account(self.app.client_id()))
        }
        .await;
        observe("client_credentials", result)
    }

    /// Acquire a token and file it under the `common` realm as well.
    pub async fn authenticate_application(&self) -> Result<AccessToken> {
        let token = self.get_token().await?;
        let copies = self.app.copy_app_tokens_to_common(&self.settings.scopes);
        tracing::debug!(copies, "app token filed under the common realm");
        Ok(token)
    }

    /// Applications with tokens in the `common` realm, one per client id.
    pub fn list_apps(&self) -> Vec<AppIdentity> {
        self.app.common_realm_apps()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use paconn_settings::SettingsLayer;
    use serde_json::json;

    use super::*;
    use crate::cache::{AccessTokenQuery, Owner};
    use crate::errors::AuthError;
    use crate::testutil::FakeClient;

    const APP_ID: &str = "3c9a8f00-1111-4222-8333-444455556666";

    fn app_settings(tenant: Option<&str>, secret: Option<&str>) -> Settings {
        Settings::from_layer(SettingsLayer {
            client_id: Some(APP_ID.into()),
            client_secret: secret.map(str::to_string),
            tenant: tenant.map(str::to_string),
            ..Default::default()
        })
    }

    fn manager(settings: &Settings, store: &CacheStore, client: &Arc<FakeClient>) -> AppTokenManager {
        AppTokenManager::new(settings, store, Arc::clone(client) as Arc<dyn IdentityClient>).unwrap()
    }

    #[tokio::test]
    async fn authenticate_application_adds_common_copy() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let client = Arc::new(FakeClient::with_responses([json!({
            "token_type": "Bearer",
            "access_token": "app-at",
            "expires_in": 3599
        })]));
        let m = manager(&app_settings(Some("contoso"), Some("s3cret")), &store, &client);

        let token = m.authenticate_application().await.unwrap();
        assert_eq!(token.secret, "app-at");
        assert_eq!(token.account.as_deref(), Some(APP_ID));
        assert_eq!(client.token_calls().len(), 1);
        assert!(client.token_calls()[0].contains("/contoso/oauth2/v2.0/token"));

        let cache = store.token_cache(Namespace::Confidential).unwrap();
        let cache = cache.lock();
        let realms: Vec<&str> = cache
            .find_access_tokens(&AccessTokenQuery {
                owner: Owner::Application,
                client_id: Some(APP_ID),
                ..Default::default()
            })
            .into_iter()
            .map(|e| e.realm.as_str())
            .collect();
        assert_eq!(realms.len(), 2);
        assert!(realms.contains(&"contoso"));
        assert!(realms.contains(&"common"));
    }

    #[tokio::test]
    async fn common_realm_token_found_without_tenant_or_secret() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let client = Arc::new(FakeClient::with_responses([json!({"access_token": "app-at"})]));
        let _ = manager(&app_settings(Some("contoso"), Some("s3cret")), &store, &client)
            .authenticate_application()
            .await
            .unwrap();

        // A later command only knows the client id, via `--account`.
        let later = Settings::default().with_account(APP_ID);
        let m = manager(&later, &store, &client);
        assert_eq!(m.client_id(), APP_ID);
        let token = m.get_token().await.unwrap();
        assert_eq!(token.secret, "app-at");
        assert_eq!(client.token_calls().len(), 1);
    }

    #[tokio::test]
    async fn no_cache_no_secret_is_invalid_token() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let client = Arc::new(FakeClient::default());
        let m = manager(&app_settings(None, None), &store, &client);

        assert_matches!(m.get_token().await, Err(AuthError::InvalidToken));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn tenant_required_error_surfaces_and_caches_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let client = Arc::new(FakeClient::with_responses([json!({
            "error": "invalid_request",
            "error_description": "AADSTS7000216",
            "error_codes": [7_000_216]
        })]));
        let m = manager(&app_settings(None, Some("s3cret")), &store, &client);

        assert_matches!(
            m.authenticate_application().await,
            Err(AuthError::TenantRequired)
        );
        assert!(m.list_apps().is_empty());
    }

    #[tokio::test]
    async fn list_apps_is_deduplicated() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let client = Arc::new(FakeClient::with_responses([
            json!({"access_token": "a"}),
            json!({"access_token": "b"}),
        ]));
        let first = app_settings(Some("contoso"), Some("s3cret"));
        let _ = manager(&first, &store, &client)
            .authenticate_application()
            .await
            .unwrap();
        let other_scopes = Settings {
            scopes: vec!["https://service.flow.microsoft.com/.default".into()],
            ..first
        };
        let m = manager(&other_scopes, &store, &client);
        let _ = m.authenticate_application().await.unwrap();

        assert_eq!(
            m.list_apps(),
            vec![AppIdentity {
                client_id: APP_ID.into()
            }]
        );
    }
}
