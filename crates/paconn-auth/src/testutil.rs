//! Test doubles shared by the crate's unit tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::authority::AuthorityMetadata;
use crate::client::{DeviceCodeFlow, IdentityClient, InteractiveRequest};
use crate::errors::{AuthError, Result};
use crate::interaction::MessageSink;

/// Unsigned JWT carrying the claims used for cache accounts.
pub(crate) fn id_token(oid: &str, tid: &str, username: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({"oid": oid, "tid": tid, "preferred_username": username, "ver": "2.0"}).to_string(),
    );
    format!("{header}.{payload}.")
}

/// Successful delegated token response for one user.
pub(crate) fn user_grant(access_token: &str, oid: &str, tid: &str, username: &str) -> Value {
    json!({
        "token_type": "Bearer",
        "access_token": access_token,
        "refresh_token": format!("rt-{access_token}"),
        "expires_in": 3600,
        "id_token": id_token(oid, tid, username),
    })
}

/// Identity client that records calls and replays queued token responses.
#[derive(Default)]
pub(crate) struct FakeClient {
    calls: Mutex<Vec<String>>,
    responses: Mutex<VecDeque<Value>>,
}

impl FakeClient {
    /// Client that answers token requests with `responses`, in order.
    pub(crate) fn with_responses(responses: impl IntoIterator<Item = Value>) -> Self {
        Self {
            calls: Mutex::default(),
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }

    /// Names of the calls made so far.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Calls other than discovery.
    pub(crate) fn token_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c != "fetch_metadata")
            .collect()
    }

    fn record(&self, call: &str) {
        self.calls.lock().push(call.to_string());
    }

    fn next_response(&self) -> Value {
        self.responses.lock().pop_front().unwrap_or(Value::Null)
    }
}

#[async_trait]
impl IdentityClient for FakeClient {
    async fn fetch_metadata(&self, discovery_url: &str) -> Result<String> {
        self.record("fetch_metadata");
        let base = discovery_url.trim_end_matches("/v2.0/.well-known/openid-configuration");
        Ok(json!({
            "token_endpoint": format!("{base}/oauth2/v2.0/token"),
            "authorization_endpoint": format!("{base}/oauth2/v2.0/authorize"),
            "device_authorization_endpoint": format!("{base}/oauth2/v2.0/devicecode"),
        })
        .to_string())
    }

    async fn start_device_flow(
        &self,
        _metadata: &AuthorityMetadata,
        _client_id: &str,
        _scopes: &[String],
    ) -> Result<DeviceCodeFlow> {
        self.record("start_device_flow");
        Ok(DeviceCodeFlow {
            device_code: "device-code".into(),
            user_code: "ABCD-EFGH".into(),
            verification_uri: "https://microsoft.com/devicelogin".into(),
            message: "To sign in, enter the code ABCD-EFGH.".into(),
            expires_in: 900,
            interval: 5,
        })
    }

    async fn complete_device_flow(
        &self,
        _metadata: &AuthorityMetadata,
        _client_id: &str,
        _flow: &DeviceCodeFlow,
    ) -> Result<Value> {
        self.record("complete_device_flow");
        match self.next_response() {
            Value::String(s) if s == "timeout" => Err(AuthError::Timeout),
            other => Ok(other),
        }
    }

    async fn acquire_interactive(
        &self,
        _metadata: &AuthorityMetadata,
        request: &InteractiveRequest,
    ) -> Result<Value> {
        self.record(&format!(
            "acquire_interactive domain_hint={} login_hint={}",
            request.domain_hint.as_deref().unwrap_or("-"),
            request.login_hint.as_deref().unwrap_or("-"),
        ));
        Ok(self.next_response())
    }

    async fn redeem_refresh_token(
        &self,
        _metadata: &AuthorityMetadata,
        _client_id: &str,
        refresh_token: &str,
        _scopes: &[String],
    ) -> Result<Value> {
        self.record(&format!("redeem_refresh_token {refresh_token}"));
        Ok(self.next_response())
    }

    async fn acquire_for_client(
        &self,
        metadata: &AuthorityMetadata,
        client_id: &str,
        _client_secret: &str,
        _scopes: &[String],
    ) -> Result<Value> {
        self.record(&format!(
            "acquire_for_client {client_id} {}",
            metadata.token_endpoint
        ));
        Ok(self.next_response())
    }
}

/// Message sink that keeps everything shown.
#[derive(Default)]
pub(crate) struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    /// Messages shown so far.
    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl MessageSink for RecordingSink {
    fn show(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}
