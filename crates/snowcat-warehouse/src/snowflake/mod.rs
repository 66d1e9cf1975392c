//! Snowflake over its REST API.

mod auth;
mod cursor;
mod decode;
mod wire;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Serialize;
use serde::de::DeserializeOwned;
use snowcat_core::WarehouseConfig;
use tokio::sync::RwLock;
use url::Url;
use uuid::Uuid;

use crate::connection::{RowCursor, Warehouse};
use crate::error::WarehouseError;

use auth::{BrowserCallback, open_browser};
use cursor::SnowflakeCursor;
use wire::*;

const CLIENT_APP_ID: &str = "snowcat";
const CLIENT_APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const SNOWFLAKE_ACCEPT: &str = "application/snowflake";
const AUTHENTICATOR: &str = "EXTERNALBROWSER";
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(5);

struct Session {
    token: String,
    master_token: Option<String>,
}

/// A logged-in Snowflake session.
///
/// The session is shared by every request; queries run independently and
/// concurrently. An expired session token is renewed with the master token
/// transparently.
pub struct SnowflakeWarehouse {
    client: reqwest::Client,
    base_url: Url,
    session: RwLock<Session>,
    sequence: AtomicU64,
}

impl SnowflakeWarehouse {
    /// Authenticate through the browser and open a session.
    pub async fn connect(config: &WarehouseConfig) -> Result<Self, WarehouseError> {
        config
            .validate()
            .map_err(|e| WarehouseError::Config(e.to_string()))?;
        let base_url = config
            .base_url()
            .ok_or_else(|| WarehouseError::Config("account is not set".to_string()))
            .and_then(|u| Url::parse(&u).map_err(|e| WarehouseError::Config(e.to_string())))?;
        let account_name = config.account_name().unwrap_or_default();
        let login_name = config.user.clone().unwrap_or_default();

        let client = reqwest::Client::builder()
            .user_agent(format!("{CLIENT_APP_ID}/{CLIENT_APP_VERSION}"))
            .build()?;

        let callback = BrowserCallback::bind(config.callback_port).await?;
        let (sso_url, proof_key) = request_sso_url(
            &client,
            &base_url,
            &account_name,
            &login_name,
            callback.port(),
        )
        .await?;

        if config.open_browser {
            tracing::info!("Opening browser for Snowflake login");
            if let Err(e) = open_browser(&sso_url) {
                tracing::warn!(error = %e, url = %sso_url, "Could not open a browser; open the URL manually");
            }
        } else {
            tracing::info!(url = %sso_url, "Open this URL to log in to Snowflake");
        }

        let token = callback
            .token(Duration::from_secs(config.login_timeout_secs))
            .await?;

        let mut login_url = endpoint(&base_url, "/session/v1/login-request")?;
        {
            let mut query = login_url.query_pairs_mut();
            let request_id = Uuid::new_v4().to_string();
            query.append_pair("request_id", &request_id);
            if let Some(role) = &config.role {
                query.append_pair("roleName", role);
            }
            if let Some(warehouse) = &config.warehouse {
                query.append_pair("warehouse", warehouse);
            }
            if let Some(database) = &config.database {
                query.append_pair("databaseName", database);
            }
            if let Some(schema) = &config.schema {
                query.append_pair("schemaName", schema);
            }
        }

        let body = LoginRequest {
            data: LoginRequestData {
                client_app_id: CLIENT_APP_ID,
                client_app_version: CLIENT_APP_VERSION,
                account_name: account_name.clone(),
                login_name,
                authenticator: AUTHENTICATOR,
                token,
                proof_key,
                client_environment: ClientEnvironment {
                    application: CLIENT_APP_ID,
                    os: std::env::consts::OS,
                },
            },
        };
        let envelope: Envelope<LoginResponseData> =
            send_json(client.post(login_url).json(&body)).await?;
        let data = require_success(envelope).map_err(auth_failure)?;
        let session_token = data
            .token
            .ok_or_else(|| WarehouseError::Authentication("login response has no token".to_string()))?;

        tracing::info!(
            account = %account_name,
            role = config.role.as_deref().unwrap_or_default(),
            warehouse = config.warehouse.as_deref().unwrap_or_default(),
            "Authenticated to Snowflake"
        );

        Ok(Self {
            client,
            base_url,
            session: RwLock::new(Session {
                token: session_token,
                master_token: data.master_token,
            }),
            sequence: AtomicU64::new(0),
        })
    }

    async fn session_token(&self) -> String {
        self.session.read().await.token.clone()
    }

    async fn post_authed<B: Serialize, T: DeserializeOwned>(
        &self,
        url: Url,
        token: &str,
        body: &B,
    ) -> Result<Envelope<T>, WarehouseError> {
        send_json(
            self.client
                .post(url)
                .header(AUTHORIZATION, authorization(token))
                .header(ACCEPT, SNOWFLAKE_ACCEPT)
                .json(body),
        )
        .await
    }

    async fn submit(
        &self,
        sql: &str,
        request_id: &str,
    ) -> Result<(Envelope<QueryResponseData>, String), WarehouseError> {
        let mut url = endpoint(&self.base_url, "/queries/v1/query-request")?;
        url.query_pairs_mut().append_pair("requestId", request_id);

        let body = QueryRequest {
            sql_text: sql,
            async_exec: false,
            sequence_id: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            query_submission_time: chrono::Utc::now().timestamp_millis(),
        };
        let token = self.session_token().await;
        let envelope = self.post_authed(url, &token, &body).await?;
        Ok((envelope, token))
    }

    /// Renew the session token, unless another request already did.
    async fn renew(&self, expired: &str) -> Result<(), WarehouseError> {
        let mut session = self.session.write().await;
        if session.token != expired {
            return Ok(());
        }
        let master = session.master_token.clone().ok_or_else(|| {
            WarehouseError::Authentication("session expired and cannot be renewed".to_string())
        })?;

        let mut url = endpoint(&self.base_url, "/session/token-request")?;
        url.query_pairs_mut()
            .append_pair("requestId", &Uuid::new_v4().to_string());
        let body = RenewRequest {
            old_session_token: session.token.clone(),
            request_type: "RENEW",
        };
        let envelope: Envelope<RenewResponseData> =
            self.post_authed(url, &master, &body).await?;
        let data = require_success(envelope).map_err(auth_failure)?;

        session.token = data.session_token.ok_or_else(|| {
            WarehouseError::Authentication("renewal response has no session token".to_string())
        })?;
        if let Some(master) = data.master_token {
            session.master_token = Some(master);
        }
        tracing::info!("Renewed Snowflake session token");
        Ok(())
    }

    /// Poll a statement that is still running until it settles.
    async fn wait_for_result(
        &self,
        mut envelope: Envelope<QueryResponseData>,
    ) -> Result<Envelope<QueryResponseData>, WarehouseError> {
        let mut interval = Duration::from_millis(250);
        while is_in_progress(&envelope) {
            let path = envelope
                .data
                .as_ref()
                .and_then(|d| d.get_result_url.clone())
                .ok_or_else(|| {
                    WarehouseError::Protocol("running query has no result URL".to_string())
                })?;
            tokio::time::sleep(interval).await;
            interval = (interval * 2).min(MAX_POLL_INTERVAL);

            let url = endpoint(&self.base_url, &path)?;
            envelope = self.get_authed(url).await?;
        }
        Ok(envelope)
    }

    /// GET with the session token, renewing it once if it has expired.
    async fn get_authed<T: DeserializeOwned>(&self, url: Url) -> Result<Envelope<T>, WarehouseError> {
        let token = self.session_token().await;
        let envelope = self.get_with(url.clone(), &token).await?;
        if !is_session_expired(&envelope) {
            return Ok(envelope);
        }
        self.renew(&token).await?;
        let token = self.session_token().await;
        self.get_with(url, &token).await
    }

    async fn get_with<T: DeserializeOwned>(
        &self,
        url: Url,
        token: &str,
    ) -> Result<Envelope<T>, WarehouseError> {
        send_json(
            self.client
                .get(url)
                .header(AUTHORIZATION, authorization(token))
                .header(ACCEPT, SNOWFLAKE_ACCEPT),
        )
        .await
    }
}

#[async_trait]
impl Warehouse for SnowflakeWarehouse {
    async fn query(&self, sql: &str) -> Result<Box<dyn RowCursor>, WarehouseError> {
        let request_id = Uuid::new_v4().to_string();
        tracing::debug!(request_id = %request_id, sql = %sql, "Submitting statement");

        let mut abort = AbortOnDrop {
            client: self.client.clone(),
            url: endpoint(&self.base_url, "/queries/v1/abort-request")?,
            token: self.session_token().await,
            sql: sql.to_string(),
            request_id: request_id.clone(),
            armed: true,
        };

        let outcome = async {
            let (mut envelope, token) = self.submit(sql, &request_id).await?;
            if is_session_expired(&envelope) {
                self.renew(&token).await?;
                abort.token = self.session_token().await;
                envelope = self.submit(sql, &request_id).await?.0;
            }
            self.wait_for_result(envelope).await
        }
        .await;
        // Only a caller dropped mid-flight leaves the guard armed
        abort.armed = false;

        let data = require_success(outcome?)?;
        tracing::debug!(request_id = %request_id, query_id = ?data.query_id, "Statement finished");
        Ok(Box::new(SnowflakeCursor::new(self.client.clone(), data)?))
    }

    async fn close(&self) -> Result<(), WarehouseError> {
        let mut url = endpoint(&self.base_url, "/session")?;
        url.query_pairs_mut().append_pair("delete", "true");
        let token = self.session_token().await;
        let envelope: Envelope<serde_json::Value> = self
            .post_authed(url, &token, &serde_json::json!({}))
            .await?;
        if !envelope.success {
            tracing::warn!(message = ?envelope.message, "Snowflake session close was rejected");
        } else {
            tracing::info!("Closed Snowflake session");
        }
        Ok(())
    }
}

/// Asks Snowflake to abort a statement whose caller went away mid-flight.
struct AbortOnDrop {
    client: reqwest::Client,
    url: Url,
    token: String,
    sql: String,
    request_id: String,
    armed: bool,
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let request = self
            .client
            .post(self.url.clone())
            .header(AUTHORIZATION, authorization(&self.token))
            .header(ACCEPT, SNOWFLAKE_ACCEPT)
            .json(&AbortRequest {
                sql_text: std::mem::take(&mut self.sql),
                request_id: self.request_id.clone(),
            });
        let request_id = self.request_id.clone();
        handle.spawn(async move {
            match request.send().await {
                Ok(_) => tracing::debug!(request_id = %request_id, "Aborted abandoned statement"),
                Err(e) => tracing::warn!(request_id = %request_id, error = %e, "Failed to abort statement"),
            }
        });
    }
}

async fn request_sso_url(
    client: &reqwest::Client,
    base_url: &Url,
    account_name: &str,
    login_name: &str,
    callback_port: u16,
) -> Result<(String, String), WarehouseError> {
    let mut url = endpoint(base_url, "/session/authenticator-request")?;
    url.query_pairs_mut()
        .append_pair("request_id", &Uuid::new_v4().to_string());
    let body = AuthenticatorRequest {
        data: AuthenticatorRequestData {
            client_app_id: CLIENT_APP_ID,
            client_app_version: CLIENT_APP_VERSION,
            account_name: account_name.to_string(),
            login_name: login_name.to_string(),
            authenticator: AUTHENTICATOR,
            browser_mode_redirect_port: callback_port.to_string(),
        },
    };
    let envelope: Envelope<AuthenticatorResponseData> =
        send_json(client.post(url).json(&body)).await?;
    let data = require_success(envelope).map_err(auth_failure)?;
    match (data.sso_url, data.proof_key) {
        (Some(sso_url), Some(proof_key)) => Ok((sso_url, proof_key)),
        _ => Err(WarehouseError::Authentication(
            "authenticator response is missing the SSO URL or proof key".to_string(),
        )),
    }
}

fn endpoint(base_url: &Url, path: &str) -> Result<Url, WarehouseError> {
    base_url
        .join(path)
        .map_err(|e| WarehouseError::Protocol(format!("invalid endpoint {path}: {e}")))
}

fn authorization(token: &str) -> String {
    format!("Snowflake Token=\"{token}\"")
}

async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<Envelope<T>, WarehouseError> {
    let response = request.send().await?;
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(WarehouseError::Authentication(format!(
            "Snowflake answered HTTP {status}"
        )));
    }
    if !status.is_success() {
        return Err(WarehouseError::Protocol(format!(
            "Snowflake answered HTTP {status}"
        )));
    }
    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| WarehouseError::Protocol(format!("malformed Snowflake response: {e}")))
}

fn is_session_expired<T>(envelope: &Envelope<T>) -> bool {
    envelope.code.as_deref() == Some(codes::SESSION_EXPIRED)
}

fn is_in_progress(envelope: &Envelope<QueryResponseData>) -> bool {
    matches!(
        envelope.code.as_deref(),
        Some(codes::QUERY_IN_PROGRESS) | Some(codes::QUERY_IN_PROGRESS_ASYNC)
    )
}

/// Unwrap a response's data, turning `success: false` into a query error
/// carrying Snowflake's code and message.
fn require_success<T: Default + SqlStateCarrier>(
    envelope: Envelope<T>,
) -> Result<T, WarehouseError> {
    if envelope.success {
        return Ok(envelope.data.unwrap_or_default());
    }
    let sql_state = envelope.data.as_ref().and_then(SqlStateCarrier::sql_state);
    Err(WarehouseError::Query {
        code: envelope.code,
        sql_state,
        message: envelope
            .message
            .unwrap_or_else(|| "Snowflake reported an unspecified error".to_string()),
    })
}

fn auth_failure(e: WarehouseError) -> WarehouseError {
    match e {
        WarehouseError::Query { code, message, .. } => {
            if code.as_deref() == Some(codes::MASTER_TOKEN_EXPIRED) {
                WarehouseError::Authentication(format!(
                    "{message} (restart to log in again)"
                ))
            } else {
                WarehouseError::Authentication(message)
            }
        }
        other => other,
    }
}

/// Response payloads that may carry an ANSI SQLSTATE on failure.
trait SqlStateCarrier {
    fn sql_state(&self) -> Option<String> {
        None
    }
}

impl SqlStateCarrier for QueryResponseData {
    fn sql_state(&self) -> Option<String> {
        self.sql_state.clone()
    }
}

impl SqlStateCarrier for LoginResponseData {}
impl SqlStateCarrier for RenewResponseData {}
impl SqlStateCarrier for AuthenticatorResponseData {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    use crate::value::CellValue;

    /// A Snowflake stand-in whose original session token `old` has expired.
    #[derive(Clone)]
    struct ExpiredSession {
        renewals: Arc<AtomicUsize>,
        // Submission answers "still running" and the expiry shows up on the poll
        slow: bool,
    }

    fn bearer(headers: &HeaderMap) -> String {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    fn expired() -> Json<Value> {
        Json(json!({"success": false, "code": "390112", "message": "Session token expired"}))
    }

    fn finished() -> Json<Value> {
        Json(json!({
            "success": true,
            "data": {
                "queryId": "01b2",
                "queryResultFormat": "json",
                "rowtype": [{"name": "A", "type": "fixed", "scale": 0}],
                "rowset": [["1"]]
            }
        }))
    }

    async fn submit_statement(State(mock): State<ExpiredSession>, headers: HeaderMap) -> Json<Value> {
        if mock.slow {
            return Json(json!({
                "success": true,
                "code": "333333",
                "data": {"getResultUrl": "/queries/01b2/result"}
            }));
        }
        if bearer(&headers).contains("\"old\"") {
            return expired();
        }
        finished()
    }

    async fn poll_result(headers: HeaderMap) -> Json<Value> {
        if bearer(&headers).contains("\"old\"") {
            return expired();
        }
        finished()
    }

    async fn renew_session(State(mock): State<ExpiredSession>, headers: HeaderMap) -> Json<Value> {
        if !bearer(&headers).contains("\"master\"") {
            return Json(json!({"success": false, "code": "390114", "message": "bad master token"}));
        }
        mock.renewals.fetch_add(1, Ordering::SeqCst);
        Json(json!({"success": true, "data": {"sessionToken": "new"}}))
    }

    async fn expired_session(slow: bool, master: Option<&str>) -> (SnowflakeWarehouse, Arc<AtomicUsize>) {
        let renewals = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/queries/v1/query-request", post(submit_statement))
            .route("/queries/01b2/result", get(poll_result))
            .route("/session/token-request", post(renew_session))
            .with_state(ExpiredSession {
                renewals: renewals.clone(),
                slow,
            });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let warehouse = SnowflakeWarehouse {
            client: reqwest::Client::new(),
            base_url: Url::parse(&format!("http://127.0.0.1:{port}")).unwrap(),
            session: RwLock::new(Session {
                token: "old".to_string(),
                master_token: master.map(str::to_string),
            }),
            sequence: AtomicU64::new(0),
        };
        (warehouse, renewals)
    }

    #[tokio::test]
    async fn test_expired_session_renewed_on_submit() {
        let (warehouse, renewals) = expired_session(false, Some("master")).await;

        let mut cursor = warehouse.query("SELECT 1 AS A").await.unwrap();
        assert_eq!(cursor.next_row().await.unwrap(), Some(vec![CellValue::Integer(1)]));
        assert_eq!(renewals.load(Ordering::SeqCst), 1);
        assert_eq!(warehouse.session_token().await, "new");
    }

    #[tokio::test]
    async fn test_expired_session_renewed_while_polling() {
        let (warehouse, renewals) = expired_session(true, Some("master")).await;

        let mut cursor = warehouse.query("SELECT 1 AS A").await.unwrap();
        assert_eq!(cursor.next_row().await.unwrap(), Some(vec![CellValue::Integer(1)]));
        assert_eq!(renewals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_session_without_master_token() {
        let (warehouse, renewals) = expired_session(false, None).await;

        let err = warehouse.query("SELECT 1 AS A").await.err().unwrap();
        assert!(matches!(err, WarehouseError::Authentication(_)));
        assert_eq!(renewals.load(Ordering::SeqCst), 0);
    }

    fn envelope(
        success: bool,
        code: Option<&str>,
        data: Option<QueryResponseData>,
    ) -> Envelope<QueryResponseData> {
        Envelope {
            data,
            code: code.map(str::to_string),
            message: Some("SQL compilation error: unknown identifier 'X'".to_string()),
            success,
        }
    }

    #[test]
    fn test_failure_carries_code_and_state() {
        let data = QueryResponseData {
            sql_state: Some("42000".to_string()),
            ..Default::default()
        };
        let err = require_success(envelope(false, Some("000904"), Some(data))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "000904 (42000): SQL compilation error: unknown identifier 'X'"
        );
    }

    #[test]
    fn test_in_progress_codes() {
        assert!(is_in_progress(&envelope(true, Some("333333"), None)));
        assert!(is_in_progress(&envelope(true, Some("333334"), None)));
        assert!(!is_in_progress(&envelope(true, None, None)));
    }

    #[test]
    fn test_master_token_expiry_is_authentication_failure() {
        let err = auth_failure(WarehouseError::Query {
            code: Some(codes::MASTER_TOKEN_EXPIRED.to_string()),
            sql_state: None,
            message: "Master token expired".to_string(),
        });
        assert!(matches!(err, WarehouseError::Authentication(_)));
    }

    #[test]
    fn test_endpoint_join_keeps_host() {
        let base = Url::parse("https://xy12345.snowflakecomputing.com").unwrap();
        let url = endpoint(&base, "/queries/01b2/result").unwrap();
        assert_eq!(url.as_str(), "https://xy12345.snowflakecomputing.com/queries/01b2/result");
    }

    #[test]
    fn test_authorization_header() {
        assert_eq!(authorization("abc"), "Snowflake Token=\"abc\"");
    }
}
