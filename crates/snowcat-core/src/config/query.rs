//! Query tool configuration.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Row cap applied to every query result.
pub const DEFAULT_MAX_RESULT_ROWS: usize = 1000;

/// Settings for the `query` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Maximum number of rows materialized per query.
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: usize,

    /// How each result row is rendered.
    #[serde(default)]
    pub row_shape: RowShape,
}

/// Representation of a result row in the query document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RowShape {
    /// Values in column order: `[1, "a"]`.
    #[default]
    Array,
    /// Column name to value: `{"ID": 1, "NAME": "a"}`.
    Map,
}

impl std::str::FromStr for RowShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "array" => Ok(RowShape::Array),
            "map" => Ok(RowShape::Map),
            other => Err(format!("unknown row shape: {other}. Use 'array' or 'map'")),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_result_rows: DEFAULT_MAX_RESULT_ROWS,
            row_shape: RowShape::default(),
        }
    }
}

impl QueryConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.max_result_rows == 0 {
            return Err(ConfigError::Config(
                "query.max_result_rows must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_max_result_rows() -> usize {
    DEFAULT_MAX_RESULT_ROWS
}
