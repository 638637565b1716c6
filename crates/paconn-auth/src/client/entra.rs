//! Microsoft Entra ID implementation of [`IdentityClient`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use url::Url;

use super::loopback::{Callback, LoopbackListener};
use super::{DeviceCodeFlow, IdentityClient, InteractiveRequest, user_scope_param};
use crate::authority::AuthorityMetadata;
use crate::errors::{AuthError, Result};
use crate::pkce::{CHALLENGE_METHOD, generate_pkce, generate_state};
use crate::validator::validate_grant;

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Poll interval used when the device code response omits one.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Device code lifetime used when the response omits one.
const DEFAULT_DEVICE_CODE_LIFETIME_SECS: u64 = 900;

/// Extra delay added to the poll interval on every `slow_down`.
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// How long the browser flow waits for the redirect.
const INTERACTIVE_TIMEOUT: Duration = Duration::from_secs(300);

fn system_browser(url: &str) -> std::io::Result<()> {
    webbrowser::open(url)
}

/// Entra ID OAuth client over `reqwest`.
#[derive(Clone, Debug)]
pub struct EntraClient {
    http: reqwest::Client,
    slow_down_step: Duration,
    interactive_timeout: Duration,
    open_browser: fn(&str) -> std::io::Result<()>,
}

impl Default for EntraClient {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl EntraClient {
    /// Client over a shared HTTP client.
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            slow_down_step: SLOW_DOWN_STEP,
            interactive_timeout: INTERACTIVE_TIMEOUT,
            open_browser: system_browser,
        }
    }

    /// Override the `slow_down` back-off step.
    #[must_use]
    pub fn with_slow_down_step(mut self, step: Duration) -> Self {
        self.slow_down_step = step;
        self
    }

    /// Override how long the browser flow waits for its redirect.
    #[must_use]
    pub fn with_interactive_timeout(mut self, timeout: Duration) -> Self {
        self.interactive_timeout = timeout;
        self
    }

    /// Override how the authorize URL is opened.
    #[must_use]
    pub fn with_browser(mut self, open: fn(&str) -> std::io::Result<()>) -> Self {
        self.open_browser = open;
        self
    }

    /// POST a form to a token-style endpoint and return its JSON body,
    /// whatever the HTTP status.
    async fn post_form(&self, endpoint: &str, form: &[(&str, &str)]) -> Result<(StatusCode, Value)> {
        let response = self.http.post(endpoint).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        let json = serde_json::from_str(&body).map_err(|_| {
            AuthError::Protocol(format!(
                "{endpoint} returned HTTP {status} with a non-JSON body"
            ))
        })?;
        Ok((status, json))
    }

    /// `authorize` URL of the browser flow.
    fn authorize_url(
        metadata: &AuthorityMetadata,
        request: &InteractiveRequest,
        redirect_uri: &str,
        challenge: &str,
        state: &str,
    ) -> Result<Url> {
        let mut url = Url::parse(&metadata.authorization_endpoint)
            .map_err(|e| AuthError::Protocol(format!("invalid authorization endpoint: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            let _ = query
                .append_pair("client_id", &request.client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("response_mode", "query")
                .append_pair("scope", &user_scope_param(&request.scopes))
                .append_pair("code_challenge", challenge)
                .append_pair("code_challenge_method", CHALLENGE_METHOD)
                .append_pair("state", state)
                .append_pair("prompt", "select_account");
            if let Some(hint) = &request.domain_hint {
                let _ = query.append_pair("domain_hint", hint);
            }
            if let Some(hint) = &request.login_hint {
                let _ = query.append_pair("login_hint", hint);
            }
        }
        Ok(url)
    }
}

/// Turn a failed non-token response (discovery, device code) into an error,
/// reusing the validator's classification when the body is an OAuth error.
fn request_failure(what: &str, status: StatusCode, body: &Value) -> AuthError {
    match validate_grant(Some(body)) {
        Err(AuthError::Unknown | AuthError::InvalidToken) | Ok(_) => {
            AuthError::Protocol(format!("{what} failed with HTTP {status}"))
        }
        Err(err) => err,
    }
}

fn u64_field(json: &Value, key: &str) -> Option<u64> {
    let value = json.get(key)?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn parse_device_flow(json: &Value) -> Option<DeviceCodeFlow> {
    let text = |key: &str| json.get(key).and_then(Value::as_str).map(str::to_string);
    let device_code = text("device_code")?;
    let user_code = text("user_code")?;
    let verification_uri = text("verification_uri").or_else(|| text("verification_url"))?;
    let message = text("message").unwrap_or_else(|| {
        format!("To sign in, use a web browser to open the page {verification_uri} and enter the code {user_code} to authenticate.")
    });
    Some(DeviceCodeFlow {
        device_code,
        user_code,
        verification_uri,
        message,
        expires_in: u64_field(json, "expires_in").unwrap_or(DEFAULT_DEVICE_CODE_LIFETIME_SECS),
        interval: u64_field(json, "interval").unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
    })
}

#[async_trait]
impl IdentityClient for EntraClient {
    #[tracing::instrument(skip_all, fields(url = %discovery_url))]
    async fn fetch_metadata(&self, discovery_url: &str) -> Result<String> {
        let response = self.http.get(discovery_url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            return Ok(body);
        }
        let json = serde_json::from_str(&body).unwrap_or(Value::Null);
        Err(request_failure("authority discovery", status, &json))
    }

    #[tracing::instrument(skip_all, fields(client_id = %client_id))]
    async fn start_device_flow(
        &self,
        metadata: &AuthorityMetadata,
        client_id: &str,
        scopes: &[String],
    ) -> Result<DeviceCodeFlow> {
        let scope = user_scope_param(scopes);
        let (status, json) = self
            .post_form(
                &metadata.device_endpoint(),
                &[("client_id", client_id), ("scope", &scope)],
            )
            .await?;
        if !status.is_success() {
            return Err(request_failure("device code request", status, &json));
        }
        parse_device_flow(&json)
            .ok_or_else(|| AuthError::Protocol("device code response is missing fields".into()))
    }

    #[tracing::instrument(skip_all, fields(client_id = %client_id))]
    async fn complete_device_flow(
        &self,
        metadata: &AuthorityMetadata,
        client_id: &str,
        flow: &DeviceCodeFlow,
    ) -> Result<Value> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(flow.expires_in);
        let mut interval = Duration::from_secs(flow.interval);

        loop {
            tokio::time::sleep(interval).await;
            if tokio::time::Instant::now() >= deadline {
                return Err(AuthError::Timeout);
            }

            let (_, json) = self
                .post_form(
                    &metadata.token_endpoint,
                    &[
                        ("grant_type", DEVICE_CODE_GRANT),
                        ("client_id", client_id),
                        ("device_code", &flow.device_code),
                    ],
                )
                .await?;

            match json.get("error").and_then(Value::as_str) {
                Some("authorization_pending") => {
                    tracing::debug!("device authorization pending");
                }
                Some("slow_down") => {
                    interval += self.slow_down_step;
                    tracing::debug!(interval_secs = interval.as_secs(), "device flow slow_down");
                }
                Some("expired_token") => return Err(AuthError::Timeout),
                _ => return Ok(json),
            }
        }
    }

    #[tracing::instrument(skip_all, fields(client_id = %request.client_id))]
    async fn acquire_interactive(
        &self,
        metadata: &AuthorityMetadata,
        request: &InteractiveRequest,
    ) -> Result<Value> {
        let listener = LoopbackListener::bind().await?;
        let redirect_uri = listener.redirect_uri().to_string();
        let pkce = generate_pkce();
        let state = generate_state();
        let url = Self::authorize_url(
            metadata,
            request,
            &redirect_uri,
            &pkce.challenge,
            &state,
        )?;

        if let Err(e) = (self.open_browser)(url.as_str()) {
            tracing::warn!(error = %e, "could not open a browser; open this URL to sign in: {url}");
        }

        let callback = tokio::time::timeout(
            self.interactive_timeout,
            listener.wait_for_callback(&state),
        )
        .await
        .map_err(|_| AuthError::Timeout)??;

        let code = match callback {
            Callback::Code(code) => code,
            Callback::Error { error, description } => {
                return Ok(serde_json::json!({
                    "error": error,
                    "error_description": description,
                }));
            }
        };

        let scope = user_scope_param(&request.scopes);
        let (_, json) = self
            .post_form(
                &metadata.token_endpoint,
                &[
                    ("grant_type", "authorization_code"),
                    ("client_id", &request.client_id),
                    ("code", &code),
                    ("redirect_uri", &redirect_uri),
                    ("code_verifier", &pkce.verifier),
                    ("scope", &scope),
                ],
            )
            .await?;
        Ok(json)
    }

    #[tracing::instrument(skip_all, fields(client_id = %client_id))]
    async fn redeem_refresh_token(
        &self,
        metadata: &AuthorityMetadata,
        client_id: &str,
        refresh_token: &str,
        scopes: &[String],
    ) -> Result<Value> {
        let scope = user_scope_param(scopes);
        let (_, json) = self
            .post_form(
                &metadata.token_endpoint,
                &[
                    ("grant_type", "refresh_token"),
                    ("client_id", client_id),
                    ("refresh_token", refresh_token),
                    ("scope", &scope),
                ],
            )
            .await?;
        Ok(json)
    }

    #[tracing::instrument(skip_all, fields(client_id = %client_id))]
    async fn acquire_for_client(
        &self,
        metadata: &AuthorityMetadata,
        client_id: &str,
        client_secret: &str,
        scopes: &[String],
    ) -> Result<Value> {
        let scope = scopes.join(" ");
        let (_, json) = self
            .post_form(
                &metadata.token_endpoint,
                &[
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id),
                    ("client_secret", client_secret),
                    ("scope", &scope),
                ],
            )
            .await?;
        Ok(json)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn metadata(server: &MockServer) -> AuthorityMetadata {
        AuthorityMetadata {
            token_endpoint: format!("{}/contoso/oauth2/v2.0/token", server.uri()),
            authorization_endpoint: format!("{}/contoso/oauth2/v2.0/authorize", server.uri()),
            device_authorization_endpoint: Some(format!(
                "{}/contoso/oauth2/v2.0/devicecode",
                server.uri()
            )),
        }
    }

    fn flow(interval: u64, expires_in: u64) -> DeviceCodeFlow {
        DeviceCodeFlow {
            device_code: "dc".into(),
            user_code: "ABCD-EFGH".into(),
            verification_uri: "https://microsoft.com/devicelogin".into(),
            message: "go".into(),
            expires_in,
            interval,
        }
    }

    fn client() -> EntraClient {
        EntraClient::default().with_slow_down_step(Duration::ZERO)
    }

    async fn mount_token_once(server: &MockServer, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path("/contoso/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .up_to_n_times(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn fetch_metadata_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contoso/v2.0/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"token_endpoint":"t"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let body = client()
            .fetch_metadata(&format!(
                "{}/contoso/v2.0/.well-known/openid-configuration",
                server.uri()
            ))
            .await
            .unwrap();
        assert_eq!(body, r#"{"token_endpoint":"t"}"#);
    }

    #[tokio::test]
    async fn fetch_metadata_surfaces_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_tenant",
                "error_description": "AADSTS90002: Tenant not found."
            })))
            .mount(&server)
            .await;

        let err = client()
            .fetch_metadata(&format!("{}/nope/v2.0/.well-known/openid-configuration", server.uri()))
            .await
            .unwrap_err();
        assert_matches!(err, AuthError::ProviderError { error, .. } if error == "invalid_tenant");
    }

    #[tokio::test]
    async fn start_device_flow_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contoso/oauth2/v2.0/devicecode"))
            .and(body_string_contains("client_id=app"))
            .and(body_string_contains("offline_access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "device_code": "dc",
                "user_code": "ABCD-EFGH",
                "verification_uri": "https://microsoft.com/devicelogin",
                "expires_in": "900",
                "interval": 5,
                "message": "To sign in, enter ABCD-EFGH."
            })))
            .mount(&server)
            .await;

        let flow = client()
            .start_device_flow(&metadata(&server), "app", &["s/.default".to_string()])
            .await
            .unwrap();
        assert_eq!(flow.user_code, "ABCD-EFGH");
        assert_eq!(flow.expires_in, 900);
        assert_eq!(flow.interval, 5);
        assert_eq!(flow.message, "To sign in, enter ABCD-EFGH.");
    }

    #[tokio::test]
    async fn device_flow_polls_through_pending_and_slow_down() {
        let server = MockServer::start().await;
        mount_token_once(&server, 400, json!({"error": "authorization_pending"})).await;
        mount_token_once(&server, 400, json!({"error": "slow_down"})).await;
        mount_token_once(&server, 200, json!({"access_token": "at", "expires_in": 3600})).await;

        let raw = client()
            .complete_device_flow(&metadata(&server), "app", &flow(0, 60))
            .await
            .unwrap();
        assert_eq!(raw["access_token"], "at");
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn device_flow_returns_other_errors_raw() {
        let server = MockServer::start().await;
        mount_token_once(
            &server,
            400,
            json!({"error": "authorization_declined", "error_description": "declined"}),
        )
        .await;

        let raw = client()
            .complete_device_flow(&metadata(&server), "app", &flow(0, 60))
            .await
            .unwrap();
        assert_eq!(raw["error"], "authorization_declined");
    }

    #[tokio::test]
    async fn device_flow_expired_token_is_timeout() {
        let server = MockServer::start().await;
        mount_token_once(&server, 400, json!({"error": "expired_token"})).await;

        assert_matches!(
            client()
                .complete_device_flow(&metadata(&server), "app", &flow(0, 60))
                .await,
            Err(AuthError::Timeout)
        );
    }

    #[tokio::test]
    async fn device_flow_past_deadline_is_timeout() {
        let server = MockServer::start().await;
        assert_matches!(
            client()
                .complete_device_flow(&metadata(&server), "app", &flow(0, 0))
                .await,
            Err(AuthError::Timeout)
        );
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn client_credentials_sends_secret_and_returns_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_secret=s3cret"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_codes": [7_000_216]
            })))
            .mount(&server)
            .await;

        let raw = client()
            .acquire_for_client(&metadata(&server), "app", "s3cret", &["s/.default".to_string()])
            .await
            .unwrap();
        assert_eq!(raw["error_codes"][0], 7_000_216);
    }

    #[tokio::test]
    async fn refresh_token_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at2"})))
            .expect(1)
            .mount(&server)
            .await;

        let raw = client()
            .redeem_refresh_token(&metadata(&server), "app", "rt-1", &["s/.default".to_string()])
            .await
            .unwrap();
        assert_eq!(raw["access_token"], "at2");
    }

    #[tokio::test]
    async fn non_json_token_response_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        assert_matches!(
            client()
                .redeem_refresh_token(&metadata(&server), "app", "rt", &[])
                .await,
            Err(AuthError::Protocol(_))
        );
    }

    #[test]
    fn authorize_url_carries_pkce_and_hints() {
        let md = AuthorityMetadata {
            token_endpoint: "https://login.example/t/oauth2/v2.0/token".into(),
            authorization_endpoint: "https://login.example/t/oauth2/v2.0/authorize".into(),
            device_authorization_endpoint: None,
        };
        let request = InteractiveRequest {
            client_id: "app".into(),
            scopes: vec!["s/.default".into()],
            domain_hint: Some("contoso.com".into()),
            login_hint: Some("alice@contoso.com".into()),
        };
        let url =
            EntraClient::authorize_url(&md, &request, "http://localhost:1234", "chal", "st").unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["code_challenge"], "chal");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["state"], "st");
        assert_eq!(pairs["redirect_uri"], "http://localhost:1234");
        assert_eq!(pairs["domain_hint"], "contoso.com");
        assert_eq!(pairs["login_hint"], "alice@contoso.com");
        assert_eq!(pairs["scope"], "s/.default openid profile offline_access");
    }

    /// Stands in for the browser: follows the authorize URL's redirect
    /// straight back to the loopback listener with a code.
    fn consenting_browser(url: &str) -> std::io::Result<()> {
        let url = Url::parse(url).map_err(std::io::Error::other)?;
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        let port: u16 = pairs["redirect_uri"]
            .trim_start_matches("http://localhost:")
            .parse()
            .map_err(std::io::Error::other)?;
        let state = pairs["state"].clone();
        drop(tokio::spawn(async move {
            let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            let request = format!(
                "GET /?code=auth-code&state={state} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
            );
            stream.write_all(request.as_bytes()).await.unwrap();
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink).await;
        }));
        Ok(())
    }

    fn idle_browser(_url: &str) -> std::io::Result<()> {
        Ok(())
    }

    #[tokio::test]
    async fn interactive_flow_redeems_code_with_verifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contoso/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code"))
            .and(body_string_contains("code_verifier="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at"})))
            .expect(1)
            .mount(&server)
            .await;

        let raw = client()
            .with_browser(consenting_browser)
            .acquire_interactive(
                &metadata(&server),
                &InteractiveRequest {
                    client_id: "app".into(),
                    scopes: vec!["s/.default".into()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(raw["access_token"], "at");
    }

    #[tokio::test]
    async fn interactive_flow_times_out_without_redirect() {
        let server = MockServer::start().await;
        let result = client()
            .with_browser(idle_browser)
            .with_interactive_timeout(Duration::from_millis(50))
            .acquire_interactive(&metadata(&server), &InteractiveRequest::default())
            .await;
        assert_matches!(result, Err(AuthError::Timeout));
    }
}
