//! Identity provider client seam.
//!
//! [`IdentityClient`] wraps the four grant exchanges the token managers need
//! plus discovery. Token requests return the provider's raw JSON (success or
//! OAuth error alike) so that interpretation stays in the validator.

pub mod entra;
pub mod loopback;

use async_trait::async_trait;
use serde_json::Value;

use crate::authority::AuthorityMetadata;
use crate::errors::Result;

pub use entra::EntraClient;

/// Scopes added to every delegated (user) request.
pub const RESERVED_SCOPES: &[&str] = &["openid", "profile", "offline_access"];

/// A started device authorization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceCodeFlow {
    /// Opaque code polled against the token endpoint.
    pub device_code: String,
    /// Code the user types at the verification page.
    pub user_code: String,
    /// Verification page.
    pub verification_uri: String,
    /// Human-readable instructions from the provider.
    pub message: String,
    /// Seconds until the device code expires.
    pub expires_in: u64,
    /// Minimum seconds between polls.
    pub interval: u64,
}

/// Parameters of a browser sign-in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InteractiveRequest {
    /// Application (client) id.
    pub client_id: String,
    /// Requested resource scopes.
    pub scopes: Vec<String>,
    /// Tenant hint for the sign-in page.
    pub domain_hint: Option<String>,
    /// Username pre-filled on the sign-in page.
    pub login_hint: Option<String>,
}

/// Network operations against the identity provider.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// GET the discovery document; returns the body.
    async fn fetch_metadata(&self, discovery_url: &str) -> Result<String>;

    /// Request a device code for `scopes`.
    async fn start_device_flow(
        &self,
        metadata: &AuthorityMetadata,
        client_id: &str,
        scopes: &[String],
    ) -> Result<DeviceCodeFlow>;

    /// Poll until the user finishes the device flow.
    async fn complete_device_flow(
        &self,
        metadata: &AuthorityMetadata,
        client_id: &str,
        flow: &DeviceCodeFlow,
    ) -> Result<Value>;

    /// Browser sign-in with authorization code + PKCE.
    async fn acquire_interactive(
        &self,
        metadata: &AuthorityMetadata,
        request: &InteractiveRequest,
    ) -> Result<Value>;

    /// Redeem a refresh token for `scopes`.
    async fn redeem_refresh_token(
        &self,
        metadata: &AuthorityMetadata,
        client_id: &str,
        refresh_token: &str,
        scopes: &[String],
    ) -> Result<Value>;

    /// Client credentials grant.
    async fn acquire_for_client(
        &self,
        metadata: &AuthorityMetadata,
        client_id: &str,
        client_secret: &str,
        scopes: &[String],
    ) -> Result<Value>;
}

/// `scope` parameter for delegated requests: `scopes` followed by the
/// reserved OpenID scopes not already present.
pub fn user_scope_param(scopes: &[String]) -> String {
    let mut all: Vec<&str> = scopes.iter().map(String::as_str).collect();
    for reserved in RESERVED_SCOPES {
        if !all.iter().any(|s| s.eq_ignore_ascii_case(reserved)) {
            all.push(reserved);
        }
    }
    all.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_scopes_are_appended_once() {
        let scopes = vec!["https://service.powerapps.com/.default".to_string(), "OpenID".into()];
        assert_eq!(
            user_scope_param(&scopes),
            "https://service.powerapps.com/.default OpenID profile offline_access"
        );
    }
}
