//! Shared client-application plumbing used by both token managers.
//!
//! A [`ClientApplication`] binds one client id and authority to an
//! [`IdentityClient`] and the caches of one namespace. It resolves endpoint
//! metadata (through the HTTP cache), records successful grants in the token
//! cache, and turns fresh cached tokens back into raw responses so that
//! every token still passes through the validator.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};

use crate::authority::{Authority, AuthorityMetadata, COMMON_REALM};
use crate::cache::{
    AccessTokenEntry, AccessTokenQuery, AccountEntry, Owner, RefreshTokenEntry, SharedHttpCache,
    SharedTokenCache,
};
use crate::client::IdentityClient;
use crate::errors::{AuthError, Result};
use crate::id_token::IdTokenClaims;
use crate::types::{AccessToken, AppIdentity, UserAccount};
use crate::validator::validate_grant;

/// Cached access tokens within this many seconds of expiry are not reused.
pub const TOKEN_EXPIRY_BUFFER_SECONDS: i64 = 300;

/// Maximum age of a cached discovery document.
const METADATA_MAX_AGE_SECS: i64 = 24 * 60 * 60;

/// Client id, authority, identity client and caches of one namespace.
pub struct ClientApplication {
    client_id: String,
    authority: Authority,
    client: Arc<dyn IdentityClient>,
    tokens: SharedTokenCache,
    http: SharedHttpCache,
}

impl std::fmt::Debug for ClientApplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientApplication")
            .field("client_id", &self.client_id)
            .field("authority", &self.authority)
            .finish_non_exhaustive()
    }
}

impl ClientApplication {
    /// Bind a client id and authority to a namespace's caches.
    pub fn new(
        client_id: impl Into<String>,
        authority: Authority,
        client: Arc<dyn IdentityClient>,
        tokens: SharedTokenCache,
        http: SharedHttpCache,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            authority,
            client,
            tokens,
            http,
        }
    }

    /// Application (client) id.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Parsed authority.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// The identity provider client.
    pub fn client(&self) -> &dyn IdentityClient {
        self.client.as_ref()
    }

    /// Endpoint metadata, from the HTTP cache when fresh.
    pub async fn metadata(&self) -> Result<AuthorityMetadata> {
        let url = self.authority.discovery_url();
        let now = Utc::now().timestamp();

        let cached = self
            .http
            .lock()
            .get(&url, now, METADATA_MAX_AGE_SECS)
            .map(str::to_string);
        if let Some(body) = cached {
            match AuthorityMetadata::from_discovery(&body) {
                Ok(metadata) => {
                    tracing::debug!(%url, "authority metadata from cache");
                    return Ok(metadata);
                }
                Err(e) => tracing::warn!(%url, error = %e, "ignoring cached authority metadata"),
            }
        }

        let body = self.client.fetch_metadata(&url).await?;
        let metadata = AuthorityMetadata::from_discovery(&body)?;
        self.http.lock().insert(url, body, now);
        Ok(metadata)
    }

    /// Record a delegated grant: access token, refresh token and account.
    ///
    /// The account comes from the response's id token, or `known` when the
    /// response carries none (refresh redemptions). Returns the account the
    /// grant was recorded for; responses that do not validate are not
    /// recorded.
    pub fn record_user_grant(
        &self,
        raw: &Value,
        scopes: &[String],
        known: Option<&UserAccount>,
    ) -> Option<UserAccount> {
        let grant = validate_grant(Some(raw)).ok()?;

        let from_claims = grant.id_token.as_deref().and_then(|id_token| {
            match IdTokenClaims::decode(id_token) {
                Ok(claims) => Some(claims),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring undecodable id token");
                    None
                }
            }
        });
        let (account, local_account_id) = match &from_claims {
            Some(claims) => {
                let (Some(home_account_id), Some(tenant)) =
                    (claims.home_account_id(), claims.tid.clone())
                else {
                    tracing::warn!("id token lacks object or tenant id; grant not cached");
                    return None;
                };
                let username = claims
                    .username()
                    .map(str::to_string)
                    .or_else(|| known.map(|k| k.username.clone()))
                    .unwrap_or_else(|| home_account_id.clone());
                (
                    UserAccount {
                        username,
                        home_account_id,
                        realm: tenant,
                    },
                    claims.object_id().unwrap_or_default().to_string(),
                )
            }
            None => {
                let Some(known) = known else {
                    tracing::warn!("grant has no id token and no known account; not cached");
                    return None;
                };
                let local = known
                    .home_account_id
                    .split('.')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                (known.clone(), local)
            }
        };

        let now = Utc::now().timestamp();
        let environment = self.authority.environment.clone();
        let mut cache = self.tokens.lock();
        cache.add_access_token(AccessTokenEntry {
            home_account_id: Some(account.home_account_id.clone()),
            environment: environment.clone(),
            client_id: self.client_id.clone(),
            realm: account.realm.clone(),
            target: scopes.join(" "),
            secret: grant.access_token.clone(),
            token_type: grant.token_type.clone(),
            cached_at: now,
            expires_on: now.saturating_add(grant.expires_in),
        });
        if let Some(refresh_token) = &grant.refresh_token {
            cache.add_refresh_token(RefreshTokenEntry {
                home_account_id: account.home_account_id.clone(),
                environment: environment.clone(),
                client_id: self.client_id.clone(),
                secret: refresh_token.clone(),
            });
        }
        cache.add_account(AccountEntry {
            home_account_id: account.home_account_id.clone(),
            environment,
            realm: account.realm.clone(),
            local_account_id,
            username: account.username.clone(),
        });

        tracing::info!(username = %account.username, "cached user token");
        Some(account)
    }

    /// Record an application grant under the authority's tenant.
    pub fn record_app_grant(&self, raw: &Value, scopes: &[String]) -> Option<AccessTokenEntry> {
        let grant = validate_grant(Some(raw)).ok()?;
        let now = Utc::now().timestamp();
        let entry = AccessTokenEntry {
            home_account_id: None,
            environment: self.authority.environment.clone(),
            client_id: self.client_id.clone(),
            realm: self.authority.tenant.clone(),
            target: scopes.join(" "),
            secret: grant.access_token,
            token_type: grant.token_type,
            cached_at: now,
            expires_on: now.saturating_add(grant.expires_in),
        };
        self.tokens.lock().add_access_token(entry.clone());
        tracing::info!(client_id = %self.client_id, realm = %entry.realm, "cached app token");
        Some(entry)
    }

    /// Fresh cached token of a user account for `scopes`, as a raw response.
    pub fn cached_user_token(&self, account: &UserAccount, scopes: &[String]) -> Option<Value> {
        self.fresh_token(&AccessTokenQuery {
            owner: Owner::User(&account.home_account_id),
            client_id: Some(&self.client_id),
            realm: Some(&account.realm),
            scopes: Some(scopes),
        })
    }

    /// Fresh cached application token for `scopes` under the authority's tenant.
    pub fn cached_app_token(&self, scopes: &[String]) -> Option<Value> {
        self.fresh_token(&AccessTokenQuery {
            owner: Owner::Application,
            client_id: Some(&self.client_id),
            realm: Some(&self.authority.tenant),
            scopes: Some(scopes),
        })
    }

    fn fresh_token(&self, query: &AccessTokenQuery<'_>) -> Option<Value> {
        let now = Utc::now().timestamp();
        let cache = self.tokens.lock();
        let entry = cache
            .find_access_tokens(query)
            .into_iter()
            .find(|e| e.is_fresh(now, TOKEN_EXPIRY_BUFFER_SECONDS))?;
        tracing::debug!(client_id = %entry.client_id, realm = %entry.realm, "cached access token hit");
        Some(json!({
            "access_token": entry.secret,
            "token_type": entry.token_type,
            "expires_in": entry.expires_on.saturating_sub(now),
        }))
    }

    /// Cached refresh token of a user account.
    pub fn refresh_token(&self, account: &UserAccount) -> Option<String> {
        self.tokens
            .lock()
            .find_refresh_token(&account.home_account_id, &self.client_id)
            .map(|e| e.secret.clone())
    }

    /// Copy the cached application tokens for `scopes` under the authority's
    /// tenant into the `common` realm. Returns how many copies were added.
    pub fn copy_app_tokens_to_common(&self, scopes: &[String]) -> usize {
        let mut cache = self.tokens.lock();
        let entries: Vec<AccessTokenEntry> = cache
            .find_access_tokens(&AccessTokenQuery {
                owner: Owner::Application,
                client_id: Some(&self.client_id),
                realm: Some(&self.authority.tenant),
                scopes: Some(scopes),
            })
            .into_iter()
            .cloned()
            .collect();
        entries
            .iter()
            .filter(|entry| cache.copy_access_token_to_realm(entry, COMMON_REALM))
            .count()
    }

    /// Cached user accounts, optionally restricted to one username.
    pub fn accounts(&self, username: Option<&str>) -> Vec<UserAccount> {
        self.tokens
            .lock()
            .accounts(username)
            .into_iter()
            .map(|a| UserAccount {
                username: a.username.clone(),
                home_account_id: a.home_account_id.clone(),
                realm: a.realm.clone(),
            })
            .collect()
    }

    /// Application identities with tokens in the `common` realm, in first-seen order.
    pub fn common_realm_apps(&self) -> Vec<AppIdentity> {
        let cache = self.tokens.lock();
        let mut apps: Vec<AppIdentity> = Vec::new();
        for entry in cache.find_access_tokens(&AccessTokenQuery {
            owner: Owner::Application,
            realm: Some(COMMON_REALM),
            ..Default::default()
        }) {
            if !apps
                .iter()
                .any(|a| a.client_id.eq_ignore_ascii_case(&entry.client_id))
            {
                apps.push(AppIdentity {
                    client_id: entry.client_id.clone(),
                });
            }
        }
        apps
    }
}

/// Record the outcome of a token acquisition under `flow`.
pub(crate) fn observe(flow: &'static str, result: Result<AccessToken>) -> Result<AccessToken> {
    let status = match &result {
        Ok(_) => "success",
        Err(AuthError::Timeout) => "timeout",
        Err(_) => "failure",
    };
    metrics::counter!("auth_token_acquisitions_total", "flow" => flow, "status" => status)
        .increment(1);
    if let Err(e) = &result {
        tracing::debug!(flow, error = %e, "token acquisition failed");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
