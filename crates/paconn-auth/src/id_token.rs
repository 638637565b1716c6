//! Minimal id token claim extraction.
//!
//! The id token arrives over TLS straight from the token endpoint and is only
//! used to name the cached account, so the signature is not verified.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::errors::{AuthError, Result};

/// Claims used to build a cache account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct IdTokenClaims {
    /// Object id of the user.
    #[serde(default)]
    pub oid: Option<String>,
    /// Subject; fallback when `oid` is absent.
    #[serde(default)]
    pub sub: Option<String>,
    /// Tenant id.
    #[serde(default)]
    pub tid: Option<String>,
    /// Sign-in name.
    #[serde(default)]
    pub preferred_username: Option<String>,
    /// Legacy UPN claim.
    #[serde(default)]
    pub upn: Option<String>,
}

impl IdTokenClaims {
    /// Decode the payload segment of a JWT.
    pub fn decode(id_token: &str) -> Result<Self> {
        let payload = id_token
            .split('.')
            .nth(1)
            .ok_or_else(|| AuthError::Protocol("id token is not a JWT".into()))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| AuthError::Protocol(format!("id token payload: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::Protocol(format!("id token claims: {e}")))
    }

    /// Object id (or subject).
    pub fn object_id(&self) -> Option<&str> {
        self.oid.as_deref().or(self.sub.as_deref())
    }

    /// Sign-in name.
    pub fn username(&self) -> Option<&str> {
        self.preferred_username.as_deref().or(self.upn.as_deref())
    }

    /// `<object id>.<tenant id>`, when both are present.
    pub fn home_account_id(&self) -> Option<String> {
        Some(format!("{}.{}", self.object_id()?, self.tid.as_deref()?))
    }
}
