//! `snowcat check` command implementation.
//!
//! Runs the full login flow and one trivial statement, so a misconfigured
//! account, role or warehouse shows up before an agent is wired in.

use anyhow::{Context, Result};
use snowcat_core::SnowcatConfig;
use snowcat_warehouse::{SnowflakeWarehouse, Warehouse};

const VERSION_SQL: &str = "SELECT CURRENT_VERSION()";

pub async fn run(config: SnowcatConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let warehouse = SnowflakeWarehouse::connect(&config.warehouse)
        .await
        .context("Failed to log in to Snowflake")?;

    let version = current_version(&warehouse).await;
    if let Err(e) = warehouse.close().await {
        tracing::warn!(error = %e, "Failed to close Snowflake session");
    }
    let version = version?;

    println!(
        "Connected to account {} as role {} (Snowflake {version})",
        config.warehouse.account.as_deref().unwrap_or_default(),
        config.warehouse.role.as_deref().unwrap_or_default(),
    );
    Ok(())
}

async fn current_version(warehouse: &dyn Warehouse) -> Result<String> {
    let mut cursor = warehouse
        .query(VERSION_SQL)
        .await
        .with_context(|| format!("Failed to run {VERSION_SQL}"))?;
    let row = cursor
        .next_row()
        .await
        .with_context(|| format!("Failed to read result of {VERSION_SQL}"))?;

    Ok(row
        .and_then(|values| values.into_iter().next())
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use snowcat_warehouse::memory::{MemoryWarehouse, ResultSet};
    use snowcat_warehouse::{CellValue, ColumnMeta};

    #[tokio::test]
    async fn test_current_version() {
        let warehouse = MemoryWarehouse::new().with_result(
            VERSION_SQL,
            ResultSet::new(vec![ColumnMeta::new("CURRENT_VERSION()", "TEXT")])
                .row(vec![CellValue::from("8.40.1")]),
        );

        assert_eq!(current_version(&warehouse).await.unwrap(), "8.40.1");
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let warehouse = MemoryWarehouse::new().with_query_error(VERSION_SQL, "warehouse suspended");

        let err = current_version(&warehouse).await.unwrap_err();
        assert!(format!("{err:#}").contains("warehouse suspended"));
    }
}
