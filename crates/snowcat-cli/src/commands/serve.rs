//! `snowcat serve` command implementation.

use anyhow::{Context, Result};
use snowcat_core::SnowcatConfig;
use snowcat_mcp::McpServer;
use snowcat_warehouse::{SnowflakeWarehouse, Warehouse};
use std::sync::Arc;
use tracing::{info, warn};

/// Log in, then serve until the transport closes or the process is interrupted.
pub async fn run(config: SnowcatConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    info!(
        account = config.warehouse.account.as_deref().unwrap_or_default(),
        role = config.warehouse.role.as_deref().unwrap_or_default(),
        transport = ?config.mcp.transport,
        "Starting snowcat"
    );

    let warehouse = Arc::new(
        SnowflakeWarehouse::connect(&config.warehouse)
            .await
            .context("Failed to log in to Snowflake")?,
    );

    let server = Arc::new(McpServer::new(
        config.mcp.clone(),
        warehouse.clone(),
        &config.query,
    ));

    let outcome = tokio::select! {
        result = server.run() => result.context("MCP server failed"),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    };

    if let Err(e) = warehouse.close().await {
        warn!(error = %e, "Failed to close Snowflake session");
    }
    info!("Snowflake session closed");

    outcome
}
