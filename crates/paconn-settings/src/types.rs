//! Settings type definitions.
//!
//! [`SettingsLayer`] is the partial, file/env/CLI shaped form: every field is
//! optional and field names are camelCase on the wire. [`Settings`] is the
//! resolved form consumed by the authentication core.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Public client id used when none is configured.
pub const DEFAULT_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";

/// Tenant used when none is configured.
pub const DEFAULT_TENANT: &str = "common";

/// Authority host the default authority URL is built from.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com/";

/// Scope requested when neither scopes nor a resource are configured.
pub const DEFAULT_SCOPE: &str = "https://service.powerapps.com/.default";

/// One layer of optional settings values.
///
/// Unknown keys in `settings.json` (connector id, environment, file names)
/// belong to other commands and are ignored here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsLayer {
    /// Application (client) id registered with the identity provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Client secret; selects the application login flow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Tenant id or domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    /// Authority URL, e.g. `https://login.microsoftonline.com/contoso`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority_url: Option<String>,
    /// Resource URL, converted to a `<resource>/.default` scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Space-delimited scopes. Takes precedence over `resource`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<String>,
    /// Username used as login hint and for the silent check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Logged-in username or application client id to act as.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Use the browser flow instead of the device code flow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interactive_login: Option<bool>,
    /// Opt out of the platform account broker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_broker_on_windows: Option<bool>,
}

impl SettingsLayer {
    /// Overlay `other` on top of `self`: every value set in `other` wins.
    ///
    /// Blank strings count as unset so an empty env var or flag does not
    /// erase a value from a lower layer.
    pub fn overlay(&mut self, other: SettingsLayer) {
        fn take(slot: &mut Option<String>, value: Option<String>) {
            if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
                *slot = Some(v);
            }
        }

        take(&mut self.client_id, other.client_id);
        take(&mut self.client_secret, other.client_secret);
        take(&mut self.tenant, other.tenant);
        take(&mut self.authority_url, other.authority_url);
        take(&mut self.resource, other.resource);
        take(&mut self.scopes, other.scopes);
        take(&mut self.username, other.username);
        take(&mut self.account, other.account);
        if other.interactive_login.is_some() {
            self.interactive_login = other.interactive_login;
        }
        if other.disable_broker_on_windows.is_some() {
            self.disable_broker_on_windows = other.disable_broker_on_windows;
        }
    }
}

/// Resolved authentication settings.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    /// Application (client) id.
    pub client_id: String,
    /// Client secret, present only for application logins.
    pub client_secret: Option<String>,
    /// Tenant id or domain (`common` when unspecified).
    pub tenant: String,
    /// Authority URL.
    pub authority_url: String,
    /// Requested scopes, in order.
    pub scopes: Vec<String>,
    /// Username hint.
    pub username: Option<String>,
    /// Identity to act as (username or application client id).
    pub account: Option<String>,
    /// Browser flow instead of device code flow.
    pub interactive_login: bool,
    /// Platform broker opt-out.
    pub disable_broker_on_windows: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_layer(SettingsLayer::default())
    }
}

impl Settings {
    /// Resolve a merged layer into settings, applying defaults.
    pub fn from_layer(layer: SettingsLayer) -> Self {
        let tenant = non_blank(layer.tenant).unwrap_or_else(|| DEFAULT_TENANT.to_string());
        let authority_url = non_blank(layer.authority_url)
            .unwrap_or_else(|| format!("{DEFAULT_AUTHORITY_HOST}{tenant}"));

        let scopes = match (non_blank(layer.scopes), non_blank(layer.resource)) {
            (Some(scopes), _) => parse_scopes(&scopes),
            (None, Some(resource)) => vec![format!("{}/.default", resource.trim_end_matches('/'))],
            (None, None) => vec![DEFAULT_SCOPE.to_string()],
        };

        Self {
            client_id: non_blank(layer.client_id).unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            client_secret: non_blank(layer.client_secret),
            tenant,
            authority_url,
            scopes,
            username: non_blank(layer.username),
            account: non_blank(layer.account),
            interactive_login: layer.interactive_login.unwrap_or(false),
            disable_broker_on_windows: layer.disable_broker_on_windows.unwrap_or(false),
        }
    }

    /// Whether these settings describe an application (client secret) login.
    pub fn is_application(&self) -> bool {
        self.client_secret.is_some()
    }

    /// Copy of these settings acting as `account`.
    #[must_use]
    pub fn with_account(&self, account: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
            ..self.clone()
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("tenant", &self.tenant)
            .field("authority_url", &self.authority_url)
            .field("scopes", &self.scopes)
            .field("username", &self.username)
            .field("account", &self.account)
            .field("interactive_login", &self.interactive_login)
            .field("disable_broker_on_windows", &self.disable_broker_on_windows)
            .finish()
    }
}

/// Split a space-delimited scope string into an ordered list.
pub fn parse_scopes(scopes: &str) -> Vec<String> {
    scopes.split_whitespace().map(str::to_string).collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
