//! Snowflake REST request and response bodies.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Response envelope shared by every Snowflake endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: Option<T>,
    pub code: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub success: bool,
}

/// `POST /session/authenticator-request`
#[derive(Debug, Serialize)]
pub(crate) struct AuthenticatorRequest {
    pub data: AuthenticatorRequestData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) struct AuthenticatorRequestData {
    pub client_app_id: &'static str,
    pub client_app_version: &'static str,
    pub account_name: String,
    pub login_name: String,
    pub authenticator: &'static str,
    pub browser_mode_redirect_port: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthenticatorResponseData {
    pub sso_url: Option<String>,
    pub proof_key: Option<String>,
}

/// `POST /session/v1/login-request`
#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest {
    pub data: LoginRequestData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) struct LoginRequestData {
    pub client_app_id: &'static str,
    pub client_app_version: &'static str,
    pub account_name: String,
    pub login_name: String,
    pub authenticator: &'static str,
    pub token: String,
    pub proof_key: String,
    pub client_environment: ClientEnvironment,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) struct ClientEnvironment {
    pub application: &'static str,
    pub os: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginResponseData {
    pub token: Option<String>,
    pub master_token: Option<String>,
}

/// `POST /session/token-request`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RenewRequest {
    pub old_session_token: String,
    pub request_type: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RenewResponseData {
    pub session_token: Option<String>,
    pub master_token: Option<String>,
}

/// `POST /queries/v1/query-request`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryRequest<'a> {
    pub sql_text: &'a str,
    pub async_exec: bool,
    pub sequence_id: u64,
    pub query_submission_time: i64,
}

/// `POST /queries/v1/abort-request`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AbortRequest {
    pub sql_text: String,
    pub request_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryResponseData {
    pub rowtype: Option<Vec<RowType>>,
    pub rowset: Option<Vec<Vec<Option<String>>>>,
    pub query_id: Option<String>,
    pub query_result_format: Option<String>,
    pub chunks: Option<Vec<ChunkRef>>,
    pub qrmk: Option<String>,
    pub chunk_headers: Option<HashMap<String, String>>,
    pub get_result_url: Option<String>,
    pub sql_state: Option<String>,
}

/// One result column as Snowflake describes it.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RowType {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub scale: Option<i64>,
}

/// A remote result chunk.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChunkRef {
    pub url: String,
    #[serde(default)]
    pub row_count: Option<u64>,
}

/// Error codes with protocol meaning.
pub(crate) mod codes {
    pub const QUERY_IN_PROGRESS: &str = "333333";
    pub const QUERY_IN_PROGRESS_ASYNC: &str = "333334";
    pub const SESSION_EXPIRED: &str = "390112";
    pub const MASTER_TOKEN_EXPIRED: &str = "390114";
}
