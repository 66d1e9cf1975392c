//! The `query` tool.
//!
//! Runs caller-supplied SQL verbatim and returns at most `max_result_rows`
//! rows together with the column names and declared types. Reading stops
//! as soon as the cap is reached, so the rest of a large result is never
//! fetched.

use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Value, json};
use snowcat_core::{QueryConfig, RowShape};
use snowcat_warehouse::{CellValue, ColumnMeta, Warehouse};

use crate::error::McpError;
use crate::protocol::ToolDefinition;
use crate::render::indented_json;

/// Name of the tool.
pub const QUERY_TOOL: &str = "query";

/// A result row keyed by column name, in column order.
///
/// Snowflake allows duplicate column names in a result; a later column
/// replaces the earlier value under the same key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedRow(Vec<(String, CellValue)>);

impl NamedRow {
    pub fn insert(&mut self, name: &str, value: CellValue) {
        match self.0.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CellValue> {
        self.0.iter().find(|(key, _)| key == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for NamedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// One materialized row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Row {
    Array(Vec<CellValue>),
    Map(NamedRow),
}

/// A bounded query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub column_info: Vec<ColumnMeta>,
    pub rows: Vec<Row>,
    /// The row cap was reached. More rows may or may not exist.
    pub truncated: bool,
}

#[derive(Serialize)]
struct QueryDocument<'a> {
    column_info: &'a [ColumnMeta],
    rows: &'a [Row],
    notice: String,
    truncated: bool,
}

/// Executes the `query` tool against a shared warehouse.
#[derive(Clone)]
pub struct QueryExecutor {
    warehouse: Arc<dyn Warehouse>,
    max_result_rows: usize,
    row_shape: RowShape,
}

impl QueryExecutor {
    pub fn new(warehouse: Arc<dyn Warehouse>, config: &QueryConfig) -> Self {
        Self {
            warehouse,
            max_result_rows: config.max_result_rows,
            row_shape: config.row_shape,
        }
    }

    /// The tool as advertised by `tools/list`.
    pub fn definition() -> ToolDefinition {
        ToolDefinition {
            name: QUERY_TOOL.to_string(),
            description: Some("Execute a SQL query.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "SQL query to execute.  You must use full database.schema.table when referencing tables."
                    }
                },
                "required": ["query"]
            }),
        }
    }

    /// Advisory text attached to every result.
    pub fn notice(&self) -> String {
        format!("Only first {} rows are shown", self.max_result_rows)
    }

    /// Handle a `tools/call` for this tool, returning the rendered document.
    pub async fn call(&self, arguments: &Value) -> Result<String, McpError> {
        let sql = arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidArguments {
                tool: QUERY_TOOL.to_string(),
                reason: "missing required string argument 'query'".to_string(),
            })?;

        let result = self.execute(sql).await?;
        self.render(&result)
    }

    /// Run `sql` and materialize up to `max_result_rows` rows.
    ///
    /// Any failure discards the partial result.
    pub async fn execute(&self, sql: &str) -> Result<QueryResult, McpError> {
        tracing::debug!(sql, "Executing query");

        let mut cursor = self
            .warehouse
            .query(sql)
            .await
            .map_err(McpError::QueryExecutionFailed)?;
        let column_info = cursor
            .columns()
            .map_err(McpError::ColumnIntrospectionFailed)?;

        let mut rows = Vec::new();
        while rows.len() < self.max_result_rows {
            let Some(values) = cursor.next_row().await.map_err(McpError::RowScanFailed)? else {
                break;
            };
            rows.push(self.shape(&column_info, values));
        }

        let truncated = rows.len() == self.max_result_rows;
        tracing::debug!(rows = rows.len(), truncated, "Query finished");

        Ok(QueryResult {
            column_info,
            rows,
            truncated,
        })
    }

    /// Render a result as the tool's text payload.
    pub fn render(&self, result: &QueryResult) -> Result<String, McpError> {
        indented_json(&QueryDocument {
            column_info: &result.column_info,
            rows: &result.rows,
            notice: self.notice(),
            truncated: result.truncated,
        })
    }

    fn shape(&self, columns: &[ColumnMeta], values: Vec<CellValue>) -> Row {
        match self.row_shape {
            RowShape::Array => Row::Array(values),
            RowShape::Map => {
                let mut row = NamedRow::default();
                for (column, value) in columns.iter().zip(values) {
                    row.insert(&column.name, value);
                }
                Row::Map(row)
            }
        }
    }
}
