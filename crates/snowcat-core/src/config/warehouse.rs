//! Snowflake connection configuration.
//!
//! Authentication always goes through Snowflake's external-browser (SSO)
//! flow, so no password or key material is ever stored here.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Configuration for the Snowflake connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Account identifier, e.g. `xy12345.us-east-1` or `myorg-myaccount`.
    /// Required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    /// Role to assume for the session. Required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Virtual warehouse used to run queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,

    /// Login name hint passed to the identity provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Default database for the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Default schema for the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Host override. Defaults to `<account>.snowflakecomputing.com`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// HTTPS port of the Snowflake endpoint.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds to wait for the browser login to complete.
    #[serde(default = "default_login_timeout_secs")]
    pub login_timeout_secs: u64,

    /// Local port for the browser redirect. `0` picks a free port.
    #[serde(default)]
    pub callback_port: u16,

    /// Launch the system browser automatically. When false the login URL
    /// is only logged.
    #[serde(default = "default_true")]
    pub open_browser: bool,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            account: None,
            role: None,
            warehouse: None,
            user: None,
            database: None,
            schema: None,
            host: None,
            port: default_port(),
            login_timeout_secs: default_login_timeout_secs(),
            callback_port: 0,
            open_browser: true,
        }
    }
}

impl WarehouseConfig {
    /// Check that account and role are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.account.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingField("account"));
        }
        if self.role.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingField("role"));
        }
        Ok(())
    }

    /// The account name as Snowflake expects it in login requests: the part
    /// before any region suffix, upper-cased.
    pub fn account_name(&self) -> Option<String> {
        self.account
            .as_deref()
            .and_then(|a| a.split('.').next())
            .map(str::to_uppercase)
    }

    /// Resolve the Snowflake host name.
    pub fn resolved_host(&self) -> Option<String> {
        if let Some(host) = &self.host {
            return Some(host.clone());
        }
        self.account
            .as_deref()
            .map(|account| format!("{}.snowflakecomputing.com", account.to_lowercase()))
    }

    /// Base URL of the Snowflake REST endpoint.
    pub fn base_url(&self) -> Option<String> {
        self.resolved_host().map(|host| {
            if self.port == 443 {
                format!("https://{host}")
            } else {
                format!("https://{host}:{}", self.port)
            }
        })
    }
}

fn default_port() -> u16 {
    443
}

fn default_login_timeout_secs() -> u64 {
    120
}

fn default_true() -> bool {
    true
}
