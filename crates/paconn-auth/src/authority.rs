//! Authority URL parsing and endpoint metadata.

use serde::Deserialize;
use url::Url;

use crate::errors::{AuthError, Result};

/// Realm used for credentials that must be found without an explicit tenant.
pub const COMMON_REALM: &str = "common";

/// A parsed authority, e.g. `https://login.microsoftonline.com/contoso`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Authority {
    /// Authority URL without trailing slash.
    pub url: String,
    /// Host name; the `environment` of cache entries.
    pub environment: String,
    /// Tenant segment (`common` when the URL has none).
    pub tenant: String,
}

impl Authority {
    /// Parse an authority URL.
    pub fn parse(authority_url: &str) -> Result<Self> {
        let parsed = Url::parse(authority_url)
            .map_err(|e| AuthError::Protocol(format!("invalid authority URL {authority_url}: {e}")))?;
        let environment = parsed
            .host_str()
            .ok_or_else(|| AuthError::Protocol(format!("authority URL has no host: {authority_url}")))?
            .to_lowercase();
        let tenant = parsed
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
            .unwrap_or(COMMON_REALM)
            .to_string();

        let mut url = parsed.to_string();
        while url.ends_with('/') {
            let _ = url.pop();
        }
        if parsed.path() == "/" || parsed.path().is_empty() {
            url = format!("{url}/{tenant}");
        }

        Ok(Self {
            url,
            environment,
            tenant,
        })
    }

    /// OpenID discovery document URL.
    pub fn discovery_url(&self) -> String {
        format!("{}/v2.0/.well-known/openid-configuration", self.url)
    }
}

/// Endpoints published by the authority's discovery document.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AuthorityMetadata {
    /// Token endpoint.
    pub token_endpoint: String,
    /// Authorization endpoint (browser flow).
    pub authorization_endpoint: String,
    /// Device authorization endpoint, when supported.
    #[serde(default)]
    pub device_authorization_endpoint: Option<String>,
}

impl AuthorityMetadata {
    /// Parse a discovery document body.
    pub fn from_discovery(body: &str) -> Result<Self> {
        serde_json::from_str(body)
            .map_err(|e| AuthError::Protocol(format!("invalid discovery document: {e}")))
    }

    /// Device authorization endpoint, derived from the token endpoint when
    /// the document does not list one.
    pub fn device_endpoint(&self) -> String {
        self.device_authorization_endpoint
            .clone()
            .unwrap_or_else(|| self.token_endpoint.replace("/token", "/devicecode"))
    }
}
