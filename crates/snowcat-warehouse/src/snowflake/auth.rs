//! External-browser (SSO) login.
//!
//! 1. Bind a listener on localhost for the identity provider's redirect.
//! 2. Ask Snowflake for an SSO URL and proof key, naming that port.
//! 3. Open the SSO URL in the user's browser.
//! 4. Wait for the browser to deliver the SAML token to the listener.
//! 5. Exchange token and proof key for a session token.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::{Form, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::error::WarehouseError;

const CONFIRMATION_PAGE: &str = "<!DOCTYPE html><html><head><meta charset=\"UTF-8\"/>\
<title>SAML Response for Snowflake</title></head><body>\
Your identity was confirmed and propagated to Snowflake. \
You can close this window now and go back where you started from.\
</body></html>";

/// Token delivered by the identity provider redirect.
#[derive(Debug, Deserialize)]
struct Callback {
    token: Option<String>,
}

type TokenSlot = Arc<Mutex<Option<oneshot::Sender<String>>>>;

/// A localhost listener waiting for the SSO redirect.
pub(crate) struct BrowserCallback {
    port: u16,
    token_rx: oneshot::Receiver<String>,
    shutdown_tx: oneshot::Sender<()>,
}

impl BrowserCallback {
    /// Bind the listener. Port `0` picks any free port.
    pub(crate) async fn bind(port: u16) -> Result<Self, WarehouseError> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let port = listener.local_addr()?.port();

        let (token_tx, token_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let slot: TokenSlot = Arc::new(Mutex::new(Some(token_tx)));

        let app = Router::new()
            .route("/", get(receive_query).post(receive_form))
            .with_state(slot);

        tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::warn!(error = %e, "Browser callback listener failed");
            }
        });

        tracing::debug!(port, "Listening for browser login redirect");
        Ok(Self {
            port,
            token_rx,
            shutdown_tx,
        })
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the token, then stop the listener.
    pub(crate) async fn token(self, timeout: Duration) -> Result<String, WarehouseError> {
        let result = tokio::time::timeout(timeout, self.token_rx).await;
        let _ = self.shutdown_tx.send(());
        match result {
            Ok(Ok(token)) => Ok(token),
            Ok(Err(_)) => Err(WarehouseError::Authentication(
                "browser callback listener stopped before a token arrived".to_string(),
            )),
            Err(_) => Err(WarehouseError::Authentication(format!(
                "browser login did not complete within {}s",
                timeout.as_secs()
            ))),
        }
    }
}

async fn receive_query(
    State(slot): State<TokenSlot>,
    Query(callback): Query<Callback>,
) -> Html<&'static str> {
    deliver(&slot, callback)
}

async fn receive_form(
    State(slot): State<TokenSlot>,
    Form(callback): Form<Callback>,
) -> Html<&'static str> {
    deliver(&slot, callback)
}

fn deliver(slot: &TokenSlot, callback: Callback) -> Html<&'static str> {
    match callback.token.filter(|t| !t.is_empty()) {
        Some(token) => {
            if let Some(tx) = slot.lock().ok().and_then(|mut s| s.take()) {
                let _ = tx.send(token);
            }
        }
        None => tracing::warn!("Browser redirect arrived without a token"),
    }
    Html(CONFIRMATION_PAGE)
}

/// Open `url` in the system browser.
pub(crate) fn open_browser(url: &str) -> std::io::Result<()> {
    let mut command = if cfg!(target_os = "macos") {
        let mut c = std::process::Command::new("open");
        c.arg(url);
        c
    } else if cfg!(target_os = "windows") {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", "start", "", url]);
        c
    } else {
        let mut c = std::process::Command::new("xdg-open");
        c.arg(url);
        c
    };
    command
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_from_query_string() {
        let callback = BrowserCallback::bind(0).await.unwrap();
        let port = callback.port();

        let response = reqwest::get(format!("http://127.0.0.1:{port}/?token=abc123"))
            .await
            .unwrap();
        assert!(response.status().is_success());

        let token = callback.token(Duration::from_secs(5)).await.unwrap();
        assert_eq!(token, "abc123");
    }

    #[tokio::test]
    async fn test_token_from_form_post() {
        let callback = BrowserCallback::bind(0).await.unwrap();
        let port = callback.port();

        let client = reqwest::Client::new();
        client
            .post(format!("http://127.0.0.1:{port}/"))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("token=xyz")
            .send()
            .await
            .unwrap();

        let token = callback.token(Duration::from_secs(5)).await.unwrap();
        assert_eq!(token, "xyz");
    }

    #[tokio::test]
    async fn test_timeout_without_redirect() {
        let callback = BrowserCallback::bind(0).await.unwrap();
        let err = callback.token(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, WarehouseError::Authentication(_)));
    }
}
