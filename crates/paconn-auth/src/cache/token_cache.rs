//! Serializable OAuth token cache.
//!
//! Holds three kinds of credential entries, each keyed the way the
//! identity provider's client libraries key them:
//!
//! - **Access tokens**: `<home account>-<environment>-accesstoken-<client>-<realm>-<target>`
//! - **Refresh tokens**: `<home account>-<environment>-refreshtoken-<client>--`
//! - **Accounts**: `<home account>-<environment>-<realm>`
//!
//! Keys are lowercased. Application credentials have no home account, so
//! their keys start with `-`.
//!
//! Every mutation sets a dirty flag; the cache store writes the file back
//! only while that flag is set.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A cached access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenEntry {
    /// Owning user account; `None` for application tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_account_id: Option<String>,
    /// Authority host, e.g. `login.microsoftonline.com`.
    pub environment: String,
    /// Client id the token was issued to.
    pub client_id: String,
    /// Tenant the token is scoped to.
    pub realm: String,
    /// Space-joined scopes.
    pub target: String,
    /// The bearer token.
    pub secret: String,
    /// Token type (`Bearer`).
    pub token_type: String,
    /// Unix seconds when cached.
    pub cached_at: i64,
    /// Unix seconds when the token expires.
    pub expires_on: i64,
}

impl AccessTokenEntry {
    /// Cache key for this entry.
    pub fn key(&self) -> String {
        [
            self.home_account_id.as_deref().unwrap_or(""),
            &self.environment,
            "accesstoken",
            &self.client_id,
            &self.realm,
            &self.target,
        ]
        .join("-")
        .to_lowercase()
    }

    /// Whether `scopes` is exactly this entry's scope set (case-insensitive).
    pub fn matches_scopes(&self, scopes: &[String]) -> bool {
        scope_set(self.target.split_whitespace()) == scope_set(scopes.iter().map(String::as_str))
    }

    /// Whether the token is still usable at `now` with `buffer_secs` to spare.
    pub fn is_fresh(&self, now: i64, buffer_secs: i64) -> bool {
        now.saturating_add(buffer_secs) < self.expires_on
    }
}

/// A cached refresh token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenEntry {
    /// Owning user account.
    pub home_account_id: String,
    /// Authority host.
    pub environment: String,
    /// Client id the token was issued to.
    pub client_id: String,
    /// The refresh token.
    pub secret: String,
}

impl RefreshTokenEntry {
    /// Cache key for this entry.
    pub fn key(&self) -> String {
        [
            self.home_account_id.as_str(),
            &self.environment,
            "refreshtoken",
            &self.client_id,
            "",
            "",
        ]
        .join("-")
        .to_lowercase()
    }
}

/// A cached user account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    /// `<object id>.<tenant id>`.
    pub home_account_id: String,
    /// Authority host.
    pub environment: String,
    /// Tenant the account signed into.
    pub realm: String,
    /// Object id within the tenant.
    pub local_account_id: String,
    /// Sign-in name.
    pub username: String,
}

impl AccountEntry {
    /// Cache key for this entry.
    pub fn key(&self) -> String {
        [self.home_account_id.as_str(), &self.environment, &self.realm]
            .join("-")
            .to_lowercase()
    }
}

/// Owner filter for access token lookups.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Owner<'a> {
    /// Any owner.
    #[default]
    Any,
    /// Application tokens only (no home account).
    Application,
    /// Tokens of one user account.
    User(&'a str),
}

/// Access token lookup criteria. `None` fields match anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessTokenQuery<'a> {
    /// Owner filter.
    pub owner: Owner<'a>,
    /// Client id.
    pub client_id: Option<&'a str>,
    /// Realm (tenant).
    pub realm: Option<&'a str>,
    /// Exact scope set.
    pub scopes: Option<&'a [String]>,
}

impl AccessTokenQuery<'_> {
    fn matches(&self, entry: &AccessTokenEntry) -> bool {
        let owner_ok = match self.owner {
            Owner::Any => true,
            Owner::Application => entry.home_account_id.is_none(),
            Owner::User(id) => entry
                .home_account_id
                .as_deref()
                .is_some_and(|h| h.eq_ignore_ascii_case(id)),
        };
        owner_ok
            && self
                .client_id
                .is_none_or(|c| entry.client_id.eq_ignore_ascii_case(c))
            && self.realm.is_none_or(|r| entry.realm.eq_ignore_ascii_case(r))
            && self.scopes.is_none_or(|s| entry.matches_scopes(s))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct CacheContents {
    #[serde(rename = "AccessToken", default)]
    access_tokens: BTreeMap<String, AccessTokenEntry>,
    #[serde(rename = "RefreshToken", default)]
    refresh_tokens: BTreeMap<String, RefreshTokenEntry>,
    #[serde(rename = "Account", default)]
    accounts: BTreeMap<String, AccountEntry>,
}

/// In-memory token cache with change tracking.
#[derive(Clone, Debug, Default)]
pub struct TokenCache {
    contents: CacheContents,
    dirty: bool,
}

impl TokenCache {
    /// Decode a cache file. Blank text decodes to an empty cache.
    pub fn deserialize(text: &str) -> Result<Self, serde_json::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(Self {
            contents: serde_json::from_str(text)?,
            dirty: false,
        })
    }

    /// Encode the cache as UTF-8 JSON.
    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.contents)
    }

    /// Whether the cache changed since it was loaded or last persisted.
    pub fn has_state_changed(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag after a successful write.
    pub fn mark_persisted(&mut self) {
        self.dirty = false;
    }

    /// Whether the cache holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.contents.access_tokens.is_empty()
            && self.contents.refresh_tokens.is_empty()
            && self.contents.accounts.is_empty()
    }

    /// Insert or replace an access token.
    pub fn add_access_token(&mut self, entry: AccessTokenEntry) {
        let _ = self.contents.access_tokens.insert(entry.key(), entry);
        self.dirty = true;
    }

    /// Insert or replace a refresh token.
    pub fn add_refresh_token(&mut self, entry: RefreshTokenEntry) {
        let _ = self.contents.refresh_tokens.insert(entry.key(), entry);
        self.dirty = true;
    }

    /// Insert or replace an account.
    pub fn add_account(&mut self, entry: AccountEntry) {
        let _ = self.contents.accounts.insert(entry.key(), entry);
        self.dirty = true;
    }

    /// Store a copy of `entry` under `realm`, keeping the original.
    ///
    /// Returns `false` (and leaves the cache untouched) when the copy
    /// already exists unchanged.
    pub fn copy_access_token_to_realm(&mut self, entry: &AccessTokenEntry, realm: &str) -> bool {
        let copy = AccessTokenEntry {
            realm: realm.to_string(),
            ..entry.clone()
        };
        if self.contents.access_tokens.get(&copy.key()) == Some(&copy) {
            return false;
        }
        self.add_access_token(copy);
        true
    }

    /// Access tokens matching `query`, in key order.
    pub fn find_access_tokens(&self, query: &AccessTokenQuery<'_>) -> Vec<&AccessTokenEntry> {
        self.contents
            .access_tokens
            .values()
            .filter(|e| query.matches(e))
            .collect()
    }

    /// Refresh token of `home_account_id` for `client_id`.
    pub fn find_refresh_token(
        &self,
        home_account_id: &str,
        client_id: &str,
    ) -> Option<&RefreshTokenEntry> {
        self.contents.refresh_tokens.values().find(|e| {
            e.home_account_id.eq_ignore_ascii_case(home_account_id)
                && e.client_id.eq_ignore_ascii_case(client_id)
        })
    }

    /// Accounts, optionally restricted to one username (case-insensitive).
    pub fn accounts(&self, username: Option<&str>) -> Vec<&AccountEntry> {
        self.contents
            .accounts
            .values()
            .filter(|a| username.is_none_or(|u| a.username.eq_ignore_ascii_case(u)))
            .collect()
    }

    /// Number of cached access tokens.
    pub fn access_token_count(&self) -> usize {
        self.contents.access_tokens.len()
    }
}

fn scope_set<'a>(scopes: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    scopes.map(str::to_lowercase).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
