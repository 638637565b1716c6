//! Loopback redirect server for the browser flow.
//!
//! Serves `GET /` on an ephemeral 127.0.0.1 port with axum. The first request
//! carrying an authorization response (`code` or `error`) is answered with a
//! small HTML page and handed back through a oneshot channel; anything else
//! gets a 404. Connections are served independently, so a browser's idle
//! pre-connect cannot hold up the real redirect.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::errors::{AuthError, Result};

const SUCCESS_PAGE: &str = "<html><body><h3>Authentication complete.</h3>\
    <p>You can close this window and return to the terminal.</p></body></html>";

const FAILURE_PAGE: &str = "<html><body><h3>Authentication failed.</h3>\
    <p>Return to the terminal for details.</p></body></html>";

/// Parameters delivered to the redirect URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Callback {
    /// The user consented; redeem this code.
    Code(String),
    /// The provider reported an OAuth error.
    Error {
        /// `error` parameter.
        error: String,
        /// `error_description` parameter.
        description: Option<String>,
    },
}

impl Callback {
    /// Authorization response in `params`; `error` wins over `code`.
    fn from_params(params: &HashMap<String, String>) -> Option<Self> {
        match (params.get("error"), params.get("code")) {
            (Some(error), _) => Some(Self::Error {
                error: error.clone(),
                description: params.get("error_description").cloned(),
            }),
            (None, Some(code)) => Some(Self::Code(code.clone())),
            (None, None) => None,
        }
    }
}

type CallbackSender = oneshot::Sender<Result<Callback>>;

#[derive(Clone)]
struct RedirectContext {
    expected_state: Arc<str>,
    tx: Arc<Mutex<Option<CallbackSender>>>,
}

impl RedirectContext {
    fn deliver(&self, result: Result<Callback>) {
        if let Some(tx) = self.tx.lock().take() {
            let _ = tx.send(result);
        }
    }
}

async fn handle_redirect(
    State(ctx): State<RedirectContext>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<&'static str>) {
    let Some(callback) = Callback::from_params(&params) else {
        return (StatusCode::NOT_FOUND, Html(""));
    };

    if params.get("state").map(String::as_str) != Some(&*ctx.expected_state) {
        ctx.deliver(Err(AuthError::Protocol(
            "authorization response state does not match the request".into(),
        )));
        return (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE));
    }

    let page = match callback {
        Callback::Code(_) => SUCCESS_PAGE,
        Callback::Error { .. } => FAILURE_PAGE,
    };
    ctx.deliver(Ok(callback));
    (StatusCode::OK, Html(page))
}

/// A bound loopback listener.
#[derive(Debug)]
pub struct LoopbackListener {
    listener: TcpListener,
    redirect_uri: String,
}

impl LoopbackListener {
    /// Bind an ephemeral port on the loopback interface.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| AuthError::Protocol(format!("cannot bind loopback listener: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Protocol(format!("loopback listener address: {e}")))?
            .port();
        Ok(Self {
            listener,
            redirect_uri: format!("http://localhost:{port}"),
        })
    }

    /// `http://localhost:<port>`.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Serve the redirect URI until the authorization response carrying
    /// `expected_state` arrives. A mismatched `state` aborts the flow.
    ///
    /// The server shuts down gracefully once this returns or is dropped.
    pub async fn wait_for_callback(self, expected_state: &str) -> Result<Callback> {
        let (tx, rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = Router::new()
            .route("/", get(handle_redirect))
            .with_state(RedirectContext {
                expected_state: Arc::from(expected_state),
                tx: Arc::new(Mutex::new(Some(tx))),
            });

        let server = axum::serve(self.listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        drop(tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::debug!(error = %e, "loopback server stopped");
            }
        }));

        let result = rx
            .await
            .map_err(|_| AuthError::Protocol("loopback server stopped unexpectedly".into()))?;
        let _ = shutdown_tx.send(());
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;

    fn port_of(uri: &str) -> u16 {
        uri.trim_start_matches("http://localhost:").parse().unwrap()
    }

    async fn send(uri: &str, target: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port_of(uri))).await.unwrap();
        stream
            .write_all(
                format!("GET {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
                    .as_bytes(),
            )
            .await
            .unwrap();
        let mut response = String::new();
        let _ = stream.read_to_string(&mut response).await.unwrap();
        response
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn error_wins_over_code() {
        let callback = Callback::from_params(&params(&[
            ("error", "access_denied"),
            ("error_description", "User cancelled"),
            ("code", "x"),
        ]));
        assert_eq!(
            callback,
            Some(Callback::Error {
                error: "access_denied".into(),
                description: Some("User cancelled".into()),
            })
        );
    }

    #[test]
    fn no_code_or_error_is_not_a_callback() {
        assert!(Callback::from_params(&params(&[("state", "s")])).is_none());
    }

    #[tokio::test]
    async fn delivers_code_after_skipping_noise() {
        let listener = LoopbackListener::bind().await.unwrap();
        let uri = listener.redirect_uri().to_string();
        assert!(uri.starts_with("http://localhost:"));

        let browser = tokio::spawn(async move {
            let favicon = send(&uri, "/favicon.ico").await;
            let bare = send(&uri, "/").await;
            let done = send(&uri, "/?code=abc%2F1&state=expected&session_state=x").await;
            (favicon, bare, done)
        });

        let callback = listener.wait_for_callback("expected").await.unwrap();
        assert_eq!(callback, Callback::Code("abc/1".into()));

        let (favicon, bare, done) = browser.await.unwrap();
        assert!(favicon.starts_with("HTTP/1.1 404"));
        assert!(bare.starts_with("HTTP/1.1 404"));
        assert!(done.starts_with("HTTP/1.1 200"));
        assert!(done.contains("Authentication complete"));
    }

    #[tokio::test]
    async fn idle_connection_does_not_block_redirect() {
        let listener = LoopbackListener::bind().await.unwrap();
        let uri = listener.redirect_uri().to_string();

        let browser = tokio::spawn(async move {
            let idle = TcpStream::connect(("127.0.0.1", port_of(&uri))).await.unwrap();
            let done = send(&uri, "/?code=the-code&state=expected").await;
            drop(idle);
            done
        });

        let callback = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            listener.wait_for_callback("expected"),
        )
        .await
        .expect("redirect must not wait behind the idle connection")
        .unwrap();
        assert_eq!(callback, Callback::Code("the-code".into()));
        assert!(browser.await.unwrap().starts_with("HTTP/1.1 200"));
    }

    #[tokio::test]
    async fn state_mismatch_aborts() {
        let listener = LoopbackListener::bind().await.unwrap();
        let uri = listener.redirect_uri().to_string();
        let browser = tokio::spawn(async move { send(&uri, "/?code=c&state=forged").await });

        assert_matches!(
            listener.wait_for_callback("expected").await,
            Err(AuthError::Protocol(msg)) if msg.contains("state")
        );
        assert!(browser.await.unwrap().starts_with("HTTP/1.1 400"));
    }
}
