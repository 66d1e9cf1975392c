//! Error types for the MCP crate.

use snowcat_warehouse::WarehouseError;
use thiserror::Error;

use crate::locator::LocatorError;

/// Errors that can occur in the MCP server.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to start the server.
    #[error("failed to start MCP server: {0}")]
    StartupFailed(String),

    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Tool not found.
    #[error("tool not found: {name}")]
    ToolNotFound { name: String },

    /// Invalid arguments for tool.
    #[error("invalid arguments for tool {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// The resource locator does not address a catalog object.
    #[error(transparent)]
    InvalidLocator(#[from] LocatorError),

    /// A catalog statement failed in the warehouse.
    #[error("Failed to run query '{query}': {source}")]
    CatalogQueryFailed {
        query: String,
        #[source]
        source: WarehouseError,
    },

    /// The caller's SQL was rejected or failed.
    #[error("Failed to execute query: {0}")]
    QueryExecutionFailed(#[source] WarehouseError),

    /// The statement ran but its columns could not be described.
    #[error("Failed to get column types: {0}")]
    ColumnIntrospectionFailed(#[source] WarehouseError),

    /// A result row could not be read.
    #[error("Failed to scan row: {0}")]
    RowScanFailed(#[source] WarehouseError),

    /// The response document could not be encoded.
    #[error("Failed to marshal result: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Transport error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl McpError {
    /// JSON-RPC error code for this failure.
    pub fn rpc_code(&self) -> i32 {
        match self {
            McpError::InvalidRequest(_) => -32600,
            McpError::ToolNotFound { .. } | McpError::InvalidArguments { .. } => -32602,
            // MCP: resource not found
            McpError::InvalidLocator(_) => -32002,
            _ => -32603,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_message_is_surfaced_verbatim() {
        let err = McpError::QueryExecutionFailed(WarehouseError::Query {
            code: Some("002003".to_string()),
            sql_state: Some("42S02".to_string()),
            message: "Object 'NOPE' does not exist or not authorized.".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Failed to execute query: 002003 (42S02): Object 'NOPE' does not exist or not authorized."
        );
    }

    #[test]
    fn test_catalog_failure_names_the_statement() {
        let err = McpError::CatalogQueryFailed {
            query: "SHOW TERSE DATABASES".to_string(),
            source: WarehouseError::query("warehouse suspended"),
        };
        assert_eq!(
            err.to_string(),
            "Failed to run query 'SHOW TERSE DATABASES': warehouse suspended"
        );
        assert_eq!(err.rpc_code(), -32603);
    }
}
