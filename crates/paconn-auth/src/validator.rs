//! Token endpoint response validation.
//!
//! Every raw response (token endpoint JSON, or one synthesized from the
//! cache) goes through [`validate`]. Raw JSON is classified into the closed
//! [`ProviderResponse`] union here and nowhere else.

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use crate::errors::{AuthError, Result};
use crate::types::AccessToken;

/// Provider error code for "client secret and tenant required".
pub const TENANT_REQUIRED_CODE: i64 = 7_000_216;

/// Lifetime assumed when a success response omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Longest lifetime honoured; larger `expires_in` values are clamped to it.
pub const MAX_EXPIRES_IN_SECS: i64 = 365 * 24 * 3600;

/// A successful token grant.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    /// Bearer token.
    pub access_token: String,
    /// Token type (`Bearer` when absent).
    pub token_type: String,
    /// Lifetime in seconds, within `0..=MAX_EXPIRES_IN_SECS`.
    pub expires_in: i64,
    /// Refresh token, for user flows.
    pub refresh_token: Option<String>,
    /// Raw id token, for user flows.
    pub id_token: Option<String>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .finish_non_exhaustive()
    }
}

impl TokenGrant {
    /// The validated access token, expiring `expires_in` seconds from now.
    pub fn to_access_token(&self) -> AccessToken {
        AccessToken {
            secret: self.access_token.clone(),
            token_type: self.token_type.clone(),
            expires_on: TimeDelta::try_seconds(self.expires_in)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            account: None,
        }
    }
}

/// An OAuth error response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderFailure {
    /// `error` field.
    pub error: String,
    /// `error_description` field.
    pub description: Option<String>,
    /// `error_codes` field (numeric provider codes).
    pub codes: Vec<i64>,
}

/// Closed classification of a non-empty provider response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderResponse {
    /// Carries an access token.
    Token(TokenGrant),
    /// Carries an OAuth error.
    Error(ProviderFailure),
    /// Neither; unknown shape.
    Malformed,
}

impl ProviderResponse {
    /// Classify a raw response body.
    pub fn classify(raw: &Value) -> Self {
        let Some(obj) = raw.as_object() else {
            return Self::Malformed;
        };

        let codes: Vec<i64> = obj
            .get("error_codes")
            .and_then(Value::as_array)
            .map(|codes| codes.iter().filter_map(as_i64).collect())
            .unwrap_or_default();

        if codes.contains(&TENANT_REQUIRED_CODE) {
            return Self::Error(ProviderFailure {
                error: string_field(raw, "error").unwrap_or_default(),
                description: string_field(raw, "error_description"),
                codes,
            });
        }

        if let Some(token) = obj.get("access_token") {
            let Some(access_token) = token.as_str() else {
                return Self::Malformed;
            };
            return Self::Token(TokenGrant {
                access_token: access_token.to_string(),
                token_type: string_field(raw, "token_type").unwrap_or_else(|| "Bearer".into()),
                expires_in: obj
                    .get("expires_in")
                    .and_then(as_i64)
                    .map_or(DEFAULT_EXPIRES_IN_SECS, |secs| secs.clamp(0, MAX_EXPIRES_IN_SECS)),
                refresh_token: string_field(raw, "refresh_token"),
                id_token: string_field(raw, "id_token"),
            });
        }

        match obj.get("error") {
            Some(error) => Self::Error(ProviderFailure {
                error: match error {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
                description: string_field(raw, "error_description"),
                codes,
            }),
            None => Self::Malformed,
        }
    }
}

/// Validate a raw provider response into an access token.
///
/// - absent, `null` or `{}` → [`AuthError::InvalidToken`]
/// - `error_codes` containing [`TENANT_REQUIRED_CODE`] → [`AuthError::TenantRequired`]
/// - `access_token` → success
/// - any other `error` → [`AuthError::ProviderError`]
/// - anything else → [`AuthError::Unknown`]
pub fn validate(raw: Option<&Value>) -> Result<AccessToken> {
    validate_grant(raw).map(|grant| grant.to_access_token())
}

/// Like [`validate`] but keeps the whole grant (refresh and id tokens) for caching.
pub fn validate_grant(raw: Option<&Value>) -> Result<TokenGrant> {
    let Some(raw) = raw.filter(|v| !is_empty_response(v)) else {
        return Err(AuthError::InvalidToken);
    };

    match ProviderResponse::classify(raw) {
        ProviderResponse::Token(grant) => Ok(grant),
        ProviderResponse::Error(failure) if failure.codes.contains(&TENANT_REQUIRED_CODE) => {
            Err(AuthError::TenantRequired)
        }
        ProviderResponse::Error(failure) => Err(AuthError::ProviderError {
            error: failure.error,
            description: failure.description,
        }),
        ProviderResponse::Malformed => Err(AuthError::Unknown),
    }
}

fn is_empty_response(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

fn as_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn absent_response_is_invalid_token() {
        assert_matches!(validate(None), Err(AuthError::InvalidToken));
        assert_matches!(validate(Some(&Value::Null)), Err(AuthError::InvalidToken));
        assert_matches!(validate(Some(&json!({}))), Err(AuthError::InvalidToken));
    }

    #[test]
    fn access_token_is_success() {
        let raw = json!({"access_token": "at", "token_type": "Bearer", "expires_in": 3599});
        let token = validate(Some(&raw)).unwrap();
        assert_eq!(token.secret, "at");
        assert_eq!(token.token_type, "Bearer");
        assert!(token.expires_on > Utc::now() + TimeDelta::seconds(3500));
    }

    #[test]
    fn out_of_range_expires_in_is_clamped() {
        let raw = json!({"access_token": "at", "expires_in": i64::MAX});
        let grant = validate_grant(Some(&raw)).unwrap();
        assert_eq!(grant.expires_in, MAX_EXPIRES_IN_SECS);
        assert_eq!(validate(Some(&raw)).unwrap().secret, "at");

        let raw = json!({"access_token": "at", "expires_in": -5});
        assert_eq!(validate_grant(Some(&raw)).unwrap().expires_in, 0);
    }

    #[test]
    fn oversized_grant_lifetime_saturates() {
        let grant = TokenGrant {
            access_token: "at".into(),
            token_type: "Bearer".into(),
            expires_in: i64::MAX,
            refresh_token: None,
            id_token: None,
        };
        assert_eq!(grant.to_access_token().expires_on, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn string_expires_in_is_accepted() {
        let raw = json!({"access_token": "at", "expires_in": "120"});
        let grant = validate_grant(Some(&raw)).unwrap();
        assert_eq!(grant.expires_in, 120);
        assert_eq!(grant.token_type, "Bearer");
    }

    #[test]
    fn grant_keeps_refresh_and_id_tokens() {
        let raw = json!({"access_token": "at", "refresh_token": "rt", "id_token": "a.b.c"});
        let grant = validate_grant(Some(&raw)).unwrap();
        assert_eq!(grant.refresh_token.as_deref(), Some("rt"));
        assert_eq!(grant.id_token.as_deref(), Some("a.b.c"));
    }

    #[test]
    fn tenant_required_code() {
        let raw = json!({
            "error": "invalid_request",
            "error_description": "AADSTS7000216: client_secret is required",
            "error_codes": [7_000_216]
        });
        assert_matches!(validate(Some(&raw)), Err(AuthError::TenantRequired));
    }

    #[test]
    fn tenant_required_code_as_string() {
        let raw = json!({"error": "invalid_request", "error_codes": ["7000216"]});
        assert_matches!(validate(Some(&raw)), Err(AuthError::TenantRequired));
    }

    #[test]
    fn other_error_is_provider_error() {
        let raw = json!({
            "error": "invalid_grant",
            "error_description": "AADSTS50173: grant expired",
            "error_codes": [50173]
        });
        assert_matches!(
            validate(Some(&raw)),
            Err(AuthError::ProviderError { error, description })
                if error == "invalid_grant"
                    && description.as_deref() == Some("AADSTS50173: grant expired")
        );
    }

    #[test]
    fn unknown_shape() {
        assert_matches!(validate(Some(&json!({"foo": 1}))), Err(AuthError::Unknown));
        assert_matches!(validate(Some(&json!("text"))), Err(AuthError::Unknown));
        assert_matches!(
            validate(Some(&json!({"access_token": 5}))),
            Err(AuthError::Unknown)
        );
    }

    #[test]
    fn classify_is_closed() {
        assert_matches!(
            ProviderResponse::classify(&json!({"access_token": "x"})),
            ProviderResponse::Token(_)
        );
        assert_matches!(
            ProviderResponse::classify(&json!({"error": "x"})),
            ProviderResponse::Error(ProviderFailure { codes, .. }) if codes.is_empty()
        );
        assert_matches!(
            ProviderResponse::classify(&json!([1, 2])),
            ProviderResponse::Malformed
        );
    }

    #[test]
    fn grant_debug_hides_secrets() {
        let raw = json!({"access_token": "super-secret", "refresh_token": "also-secret"});
        let rendered = format!("{:?}", validate_grant(Some(&raw)).unwrap());
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("also-secret"));
    }

    proptest! {
        #[test]
        fn any_access_token_response_succeeds_unchanged(
            token in "[A-Za-z0-9._-]{1,64}",
            expires_in in 1i64..86_400,
            extra in proptest::option::of("[a-z]{1,12}"),
        ) {
            let mut raw = json!({"access_token": token.clone(), "expires_in": expires_in});
            if let Some(extra) = extra {
                raw["ext_field"] = json!(extra);
            }
            let before = raw.clone();
            let validated = validate(Some(&raw)).unwrap();
            prop_assert_eq!(validated.secret, token);
            prop_assert_eq!(raw, before);
        }

        #[test]
        fn error_only_response_carries_error_text(error in "[a-z_]{1,32}") {
            let raw = json!({"error": error.clone()});
            match validate(Some(&raw)) {
                Err(AuthError::ProviderError { error: got, description }) => {
                    prop_assert_eq!(got, error);
                    prop_assert!(description.is_none());
                }
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }

        #[test]
        fn tenant_code_wins_over_other_fields(
            other_codes in proptest::collection::vec(1i64..9_999_999, 0..4),
            with_token in any::<bool>(),
            error in "[a-z_]{1,16}",
        ) {
            let mut codes = other_codes;
            codes.push(TENANT_REQUIRED_CODE);
            let mut raw = json!({"error": error, "error_codes": codes});
            if with_token {
                raw["access_token"] = json!("at");
            }
            prop_assert!(matches!(validate(Some(&raw)), Err(AuthError::TenantRequired)));
        }
    }
}
