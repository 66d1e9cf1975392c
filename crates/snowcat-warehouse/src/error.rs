//! Error types for the warehouse crate.

use thiserror::Error;

/// Errors raised by a warehouse connection.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Login or session renewal failed.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The warehouse rejected the statement. The message is Snowflake's own.
    #[error("{}", format_query_error(.code, .sql_state, .message))]
    Query {
        code: Option<String>,
        sql_state: Option<String>,
        message: String,
    },

    /// Column metadata was missing from an otherwise successful response.
    #[error("result metadata unavailable: {0}")]
    Metadata(String),

    /// A value could not be decoded into its column's type.
    #[error("cannot decode {type_name} value for column {column}: {reason}")]
    Decode {
        column: String,
        type_name: String,
        reason: String,
    },

    /// The server answered with something that is not a Snowflake response.
    #[error("unexpected response: {0}")]
    Protocol(String),

    /// Connection settings are unusable.
    #[error("invalid connection settings: {0}")]
    Config(String),

    /// HTTP transport error.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_query_error(
    code: &Option<String>,
    sql_state: &Option<String>,
    message: &str,
) -> String {
    match (code, sql_state) {
        (Some(code), Some(state)) => format!("{code} ({state}): {message}"),
        (Some(code), None) => format!("{code}: {message}"),
        _ => message.to_string(),
    }
}

impl WarehouseError {
    /// Build a query error from just a message.
    pub fn query(message: impl Into<String>) -> Self {
        WarehouseError::Query {
            code: None,
            sql_state: None,
            message: message.into(),
        }
    }
}
