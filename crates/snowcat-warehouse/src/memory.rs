//! In-memory warehouse serving canned results.
//!
//! Statements are matched by exact SQL text. Every issued statement is
//! recorded, and live cursors are counted so tests can check that nothing
//! leaks on error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::connection::{ColumnMeta, RowCursor, Warehouse};
use crate::error::WarehouseError;
use crate::value::CellValue;

/// A canned result set.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<CellValue>>,
}

impl ResultSet {
    pub fn new(columns: Vec<ColumnMeta>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row.
    pub fn row(mut self, values: Vec<CellValue>) -> Self {
        self.rows.push(values);
        self
    }

    /// A single `name` column, the shape of `SHOW TERSE ...` listings
    /// reduced to what matters.
    pub fn names(names: &[&str]) -> Self {
        let mut set = Self::new(vec![
            ColumnMeta::new("created_on", "TIMESTAMP_LTZ"),
            ColumnMeta::new("name", "TEXT"),
        ]);
        for name in names {
            set.rows.push(vec![
                CellValue::Timestamp("2024-01-01T00:00:00Z".to_string()),
                CellValue::from(*name),
            ]);
        }
        set
    }
}

#[derive(Debug, Clone)]
enum Canned {
    Rows(ResultSet),
    QueryError(String),
    ColumnsError(String),
    RowError {
        set: ResultSet,
        fail_at: usize,
        message: String,
    },
}

/// Warehouse backed by a table of SQL text to canned outcomes.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    canned: Mutex<HashMap<String, Canned>>,
    issued: Mutex<Vec<String>>,
    open_cursors: Arc<AtomicUsize>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sql` with `set`.
    pub fn with_result(self, sql: impl Into<String>, set: ResultSet) -> Self {
        self.insert(sql.into(), Canned::Rows(set));
        self
    }

    /// Fail `sql` at execution time.
    pub fn with_query_error(self, sql: impl Into<String>, message: impl Into<String>) -> Self {
        self.insert(sql.into(), Canned::QueryError(message.into()));
        self
    }

    /// Execute `sql` but fail when its columns are requested.
    pub fn with_columns_error(self, sql: impl Into<String>, message: impl Into<String>) -> Self {
        self.insert(sql.into(), Canned::ColumnsError(message.into()));
        self
    }

    /// Serve `set` but fail when row `fail_at` (zero-based) is read.
    pub fn with_row_error(
        self,
        sql: impl Into<String>,
        set: ResultSet,
        fail_at: usize,
        message: impl Into<String>,
    ) -> Self {
        self.insert(
            sql.into(),
            Canned::RowError {
                set,
                fail_at,
                message: message.into(),
            },
        );
        self
    }

    /// Statements issued so far, in order.
    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Cursors handed out and not yet dropped.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    fn insert(&self, sql: String, canned: Canned) {
        if let Ok(mut map) = self.canned.lock() {
            map.insert(sql, canned);
        }
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn query(&self, sql: &str) -> Result<Box<dyn RowCursor>, WarehouseError> {
        if let Ok(mut issued) = self.issued.lock() {
            issued.push(sql.to_string());
        }

        let canned = self
            .canned
            .lock()
            .ok()
            .and_then(|map| map.get(sql).cloned())
            .ok_or_else(|| WarehouseError::query(format!("no canned result for: {sql}")))?;

        let (set, columns_error, row_error) = match canned {
            Canned::QueryError(message) => return Err(WarehouseError::query(message)),
            Canned::Rows(set) => (set, None, None),
            Canned::ColumnsError(message) => (ResultSet::default(), Some(message), None),
            Canned::RowError {
                set,
                fail_at,
                message,
            } => (set, None, Some((fail_at, message))),
        };

        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCursor {
            columns: set.columns,
            rows: set.rows.into_iter(),
            position: 0,
            columns_error,
            row_error,
            open_cursors: self.open_cursors.clone(),
        }))
    }
}

struct MemoryCursor {
    columns: Vec<ColumnMeta>,
    rows: std::vec::IntoIter<Vec<CellValue>>,
    position: usize,
    columns_error: Option<String>,
    row_error: Option<(usize, String)>,
    open_cursors: Arc<AtomicUsize>,
}

#[async_trait]
impl RowCursor for MemoryCursor {
    fn columns(&self) -> Result<Vec<ColumnMeta>, WarehouseError> {
        match &self.columns_error {
            Some(message) => Err(WarehouseError::Metadata(message.clone())),
            None => Ok(self.columns.clone()),
        }
    }

    async fn next_row(&mut self) -> Result<Option<Vec<CellValue>>, WarehouseError> {
        if let Some((fail_at, message)) = &self.row_error {
            if *fail_at == self.position {
                return Err(WarehouseError::Decode {
                    column: "?".to_string(),
                    type_name: "?".to_string(),
                    reason: message.clone(),
                });
            }
        }
        self.position += 1;
        Ok(self.rows.next())
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.open_cursors.fetch_sub(1, Ordering::SeqCst);
    }
}
