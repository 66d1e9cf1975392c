//! # snowcat-mcp
//!
//! MCP (Model Context Protocol) server exposing a Snowflake warehouse to
//! AI agents. It offers:
//!
//! - **Catalog resources**: databases, schemas, tables, views and column
//!   descriptions, addressed by `snowflake://` locators
//! - **A `query` tool**: arbitrary SQL, capped at a bounded number of rows
//! - **Multiple Transports**: stdio and HTTP
//!
//! ## Architecture
//!
//! ```text
//! AI Agent
//!       │
//!       │ MCP protocol (resources/read, tools/call)
//!       ▼
//! ┌──────────────────────┐
//! │  McpServer           │
//! │  ├ ResourceRouter    │  SHOW TERSE ... / DESCRIBE TABLE
//! │  └ QueryExecutor     │  caller SQL, first N rows
//! └──────────┬───────────┘
//!            │ Arc<dyn Warehouse>
//!            ▼
//!       Snowflake
//! ```
//!
//! ## Locators
//!
//! | Locator | Contents |
//! |---------|----------|
//! | `snowflake://` | one entry per database |
//! | `snowflake://<db>` | one entry per schema |
//! | `snowflake://<db>/<schema>` | the `tables` and `views` collections |
//! | `snowflake://<db>/<schema>/tables` | one entry per table |
//! | `snowflake://<db>/<schema>/views` | one entry per view |
//! | `snowflake://<db>/<schema>/table/<name>` | `{"columns": [{"name", "type"}]}` |
//! | `snowflake://<db>/<schema>/view/<name>` | `{"columns": [{"name", "type"}]}` |
//!
//! ## Example Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use snowcat_core::SnowcatConfig;
//! use snowcat_mcp::McpServer;
//! use snowcat_warehouse::SnowflakeWarehouse;
//!
//! let config = SnowcatConfig::from_file("snowcat.yaml")?;
//! let warehouse = Arc::new(SnowflakeWarehouse::connect(&config.warehouse).await?);
//!
//! let server = McpServer::new(config.mcp, warehouse, &config.query);
//! Arc::new(server).run().await?;
//! ```

pub mod error;
pub mod http_transport;
pub mod locator;
pub mod protocol;
pub mod query;
pub mod render;
pub mod resources;
pub mod server;
pub mod tools;

// Re-export main types
pub use error::McpError;
pub use locator::{Locator, LocatorError, ObjectKind};
pub use protocol::{
    CallToolParams, CallToolResponse, JsonRpcRequest, JsonRpcResponse, ResourceContents,
    ToolContent, ToolDefinition,
};
pub use query::{NamedRow, QueryExecutor, QueryResult, Row};
pub use resources::{CatalogEntry, ColumnDescriptor, ResourceRouter};
pub use server::McpServer;
pub use tools::ToolRegistry;
