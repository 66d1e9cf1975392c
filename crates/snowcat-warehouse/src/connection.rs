//! The seams between Snowcat and the warehouse.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::WarehouseError;
use crate::value::CellValue;

/// Metadata for a single result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMeta {
    pub name: String,
    /// Type name as reported by the warehouse, e.g. `FIXED` or `TEXT`.
    #[serde(rename = "type")]
    pub type_name: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A shared warehouse connection.
///
/// Implementations must be safe for concurrent use: independent calls to
/// [`Warehouse::query`] may run at the same time.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run one SQL statement. The text is forwarded as-is.
    async fn query(&self, sql: &str) -> Result<Box<dyn RowCursor>, WarehouseError>;

    /// End the session. Called once at shutdown.
    async fn close(&self) -> Result<(), WarehouseError> {
        Ok(())
    }
}

/// Rows of one statement's result, in warehouse order.
///
/// A cursor belongs to exactly one caller. Dropping it releases everything
/// it holds, including result chunks not yet downloaded.
#[async_trait]
pub trait RowCursor: Send {
    /// Column names and declared types, in result order.
    fn columns(&self) -> Result<Vec<ColumnMeta>, WarehouseError>;

    /// The next row, or `None` when the result is exhausted.
    async fn next_row(&mut self) -> Result<Option<Vec<CellValue>>, WarehouseError>;
}

/// Position of a column by name, ignoring ASCII case.
pub fn column_index(columns: &[ColumnMeta], name: &str) -> Option<usize> {
    columns
        .iter()
        .position(|c| c.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_index_is_case_insensitive() {
        let columns = vec![
            ColumnMeta::new("created_on", "TIMESTAMP_LTZ"),
            ColumnMeta::new("name", "TEXT"),
        ];
        assert_eq!(column_index(&columns, "NAME"), Some(1));
        assert_eq!(column_index(&columns, "kind"), None);
    }
}
