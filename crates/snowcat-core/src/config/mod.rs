//! Configuration types for Snowcat.
//!
//! Configuration is read from a single YAML file (`snowcat.yaml` by default)
//! and then overlaid with command-line flags and environment variables by the
//! binary. Only the warehouse account and role are mandatory; everything else
//! has a default.
//!
//! ```yaml
//! warehouse:
//!   account: xy12345.us-east-1
//!   role: ANALYST
//!   warehouse: COMPUTE_WH
//! mcp:
//!   transport: stdio
//! query:
//!   max_result_rows: 1000
//!   row_shape: array
//! logging:
//!   level: info
//! ```

pub mod logging;
pub mod mcp;
pub mod query;
pub mod warehouse;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use logging::{LogFormat, LoggingConfig};
pub use mcp::{McpConfig, Transport};
pub use query::{QueryConfig, RowShape};
pub use warehouse::WarehouseConfig;

/// Complete Snowcat configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SnowcatConfig {
    /// Snowflake connection settings.
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// MCP transport settings.
    #[serde(default)]
    pub mcp: McpConfig,

    /// Query tool settings.
    #[serde(default)]
    pub query: QueryConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("missing required setting `{0}`")]
    MissingField(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SnowcatConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Check that everything needed to start serving is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.warehouse.validate()?;
        self.query.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_full_config_from_yaml() {
        let yaml = r#"
warehouse:
  account: xy12345.us-east-1
  role: ANALYST
  warehouse: COMPUTE_WH
mcp:
  transport: http
  port: 8800
query:
  max_result_rows: 250
  row_shape: map
logging:
  level: debug
  format: json
"#;
        let config = SnowcatConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.warehouse.account.as_deref(), Some("xy12345.us-east-1"));
        assert_eq!(config.warehouse.role.as_deref(), Some("ANALYST"));
        assert_eq!(config.warehouse.warehouse.as_deref(), Some("COMPUTE_WH"));
        assert_eq!(config.mcp.transport, Transport::Http);
        assert_eq!(config.mcp.port, 8800);
        assert_eq!(config.query.max_result_rows, 250);
        assert_eq!(config.query.row_shape, RowShape::Map);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SnowcatConfig::from_yaml("{}").unwrap();
        assert_eq!(config.mcp.transport, Transport::Stdio);
        assert_eq!(config.query.max_result_rows, 1000);
        assert_eq!(config.query.row_shape, RowShape::Array);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_account_is_rejected() {
        let config = SnowcatConfig::from_yaml("warehouse:\n  role: ANALYST\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("account")));
    }

    #[test]
    fn test_missing_role_is_rejected() {
        let config = SnowcatConfig::from_yaml("warehouse:\n  account: xy12345\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("role")));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "warehouse:\n  account: acme\n  role: SYSADMIN").unwrap();

        let config = SnowcatConfig::from_file(file.path()).unwrap();
        assert_eq!(config.warehouse.account.as_deref(), Some("acme"));
    }

    #[test]
    fn test_from_missing_file() {
        let err = SnowcatConfig::from_file("/nonexistent/snowcat.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
