//! Shared types for the Snowcat crates.

// Configuration types shared across all Snowcat crates
pub mod config;

pub use config::{
    ConfigError, LogFormat, LoggingConfig, McpConfig, QueryConfig, RowShape, SnowcatConfig,
    Transport, WarehouseConfig,
};
