//! Catalog browsing over MCP resources.
//!
//! Each read resolves a [`Locator`] to one catalog statement, runs it, and
//! turns every result row into the locator one level further down. Column
//! descriptions end the walk with a JSON document instead.

use std::sync::Arc;

use serde::Serialize;
use snowcat_warehouse::{CellValue, ColumnMeta, RowCursor, Warehouse, WarehouseError, column_index};

use crate::error::McpError;
use crate::locator::{Locator, LocatorError, ObjectKind};
use crate::protocol::{ResourceContents, ResourceDefinition, ResourceTemplate};
use crate::render::indented_json;

const TEXT_PLAIN: &str = "text/plain";
const APPLICATION_JSON: &str = "application/json";

/// One element of a catalog listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub locator: Locator,
    pub name: String,
}

impl CatalogEntry {
    fn into_contents(self) -> ResourceContents {
        ResourceContents {
            uri: self.locator.to_string(),
            mime_type: TEXT_PLAIN.to_string(),
            text: self.name,
        }
    }
}

/// A column of a table or view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Serialize)]
struct Definition<'a> {
    columns: &'a [ColumnDescriptor],
}

/// Routes resource reads to catalog statements.
#[derive(Clone)]
pub struct ResourceRouter {
    warehouse: Arc<dyn Warehouse>,
}

impl ResourceRouter {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self { warehouse }
    }

    /// Static resources: the database list.
    pub fn resources(&self) -> Vec<ResourceDefinition> {
        vec![ResourceDefinition {
            uri: Locator::Root.to_string(),
            name: "Database list".to_string(),
            description: Some("List of databases".to_string()),
            mime_type: TEXT_PLAIN.to_string(),
        }]
    }

    /// Resource templates for every level below the root.
    pub fn templates(&self) -> Vec<ResourceTemplate> {
        let template = |uri: &str, name: &str, description: &str, mime: &str| ResourceTemplate {
            uri_template: uri.to_string(),
            name: name.to_string(),
            description: Some(description.to_string()),
            mime_type: mime.to_string(),
        };

        vec![
            template(
                "snowflake://{database-name}",
                "Schema list in database",
                "List of schemas in a database",
                TEXT_PLAIN,
            ),
            template(
                "snowflake://{database-name}/{schema-name}",
                "Object collections in schema",
                "The tables and views collections of a schema",
                TEXT_PLAIN,
            ),
            template(
                "snowflake://{database-name}/{schema-name}/tables",
                "Table list in schema",
                "List of tables in a schema",
                TEXT_PLAIN,
            ),
            template(
                "snowflake://{database-name}/{schema-name}/views",
                "View list in schema",
                "List of views in a schema",
                TEXT_PLAIN,
            ),
            template(
                "snowflake://{database-name}/{schema-name}/table/{table-name}",
                "Table definition",
                "Definition of a table including columns and column types",
                APPLICATION_JSON,
            ),
            template(
                "snowflake://{database-name}/{schema-name}/view/{table-name}",
                "View definition",
                "Definition of a view including columns and column types",
                APPLICATION_JSON,
            ),
        ]
    }

    /// Read the resource at `uri`.
    pub async fn read(&self, uri: &str) -> Result<Vec<ResourceContents>, McpError> {
        match Locator::parse(uri)? {
            Locator::Root => self.list_databases(uri).await,
            Locator::Database { .. } => self.list_schemas(uri).await,
            Locator::Schema { .. } => self.list_collections(uri),
            Locator::Collection {
                kind: ObjectKind::Table,
                ..
            } => self.list_tables(uri).await,
            Locator::Collection {
                kind: ObjectKind::View,
                ..
            } => self.list_views(uri).await,
            Locator::Object { .. } => self.describe_object(uri).await,
        }
    }

    /// `snowflake://`: every database visible to the session.
    pub async fn list_databases(&self, uri: &str) -> Result<Vec<ResourceContents>, McpError> {
        let Locator::Root = Locator::parse(uri)? else {
            return Err(mismatch(uri, "database list"));
        };

        let names = self.names("SHOW TERSE DATABASES".to_string()).await?;
        Ok(contents(names, |name| Locator::database(name)))
    }

    /// `snowflake://<db>`: schemas of one database.
    pub async fn list_schemas(&self, uri: &str) -> Result<Vec<ResourceContents>, McpError> {
        let Locator::Database { database } = Locator::parse(uri)? else {
            return Err(mismatch(uri, "schema list"));
        };

        let names = self
            .names(format!("SHOW TERSE SCHEMAS IN DATABASE {database}"))
            .await?;
        Ok(contents(names, |name| Locator::schema(&database, name)))
    }

    /// `snowflake://<db>/<schema>`: the two object collections. Issues no SQL.
    pub fn list_collections(&self, uri: &str) -> Result<Vec<ResourceContents>, McpError> {
        let Locator::Schema { database, schema } = Locator::parse(uri)? else {
            return Err(mismatch(uri, "schema"));
        };

        Ok([ObjectKind::Table, ObjectKind::View]
            .into_iter()
            .map(|kind| {
                CatalogEntry {
                    locator: Locator::collection(&database, &schema, kind),
                    name: kind.collection().to_string(),
                }
                .into_contents()
            })
            .collect())
    }

    /// `snowflake://<db>/<schema>/tables`.
    pub async fn list_tables(&self, uri: &str) -> Result<Vec<ResourceContents>, McpError> {
        self.list_objects(uri, ObjectKind::Table).await
    }

    /// `snowflake://<db>/<schema>/views`.
    ///
    /// Runs the same `SHOW TERSE TABLES` statement as [`Self::list_tables`];
    /// only the child locators differ.
    pub async fn list_views(&self, uri: &str) -> Result<Vec<ResourceContents>, McpError> {
        self.list_objects(uri, ObjectKind::View).await
    }

    async fn list_objects(
        &self,
        uri: &str,
        expected: ObjectKind,
    ) -> Result<Vec<ResourceContents>, McpError> {
        let (database, schema) = match Locator::parse(uri)? {
            Locator::Collection {
                database,
                schema,
                kind,
            } if kind == expected => (database, schema),
            _ => return Err(mismatch(uri, expected.collection())),
        };

        let names = self
            .names(format!("SHOW TERSE TABLES IN SCHEMA {database}.{schema}"))
            .await?;
        Ok(contents(names, |name| {
            Locator::object(&database, &schema, expected, name)
        }))
    }

    /// `.../table/<name>` or `.../view/<name>`: the object's columns.
    pub async fn describe_object(&self, uri: &str) -> Result<Vec<ResourceContents>, McpError> {
        let Locator::Object {
            database,
            schema,
            name,
            ..
        } = Locator::parse(uri)?
        else {
            return Err(mismatch(uri, "table or view"));
        };

        let columns = self
            .describe(format!("DESCRIBE TABLE {database}.{schema}.{name}"))
            .await?;
        let text = indented_json(&Definition { columns: &columns })?;

        Ok(vec![ResourceContents {
            uri: uri.to_string(),
            mime_type: APPLICATION_JSON.to_string(),
            text,
        }])
    }

    async fn run(&self, sql: &str) -> Result<(Box<dyn RowCursor>, Vec<ColumnMeta>), McpError> {
        tracing::debug!(sql, "Running catalog statement");
        let failed = |source| McpError::CatalogQueryFailed {
            query: sql.to_string(),
            source,
        };
        let cursor = self.warehouse.query(sql).await.map_err(failed)?;
        let columns = cursor.columns().map_err(failed)?;
        Ok((cursor, columns))
    }

    /// The `name` column of every row, in warehouse order.
    async fn names(&self, sql: String) -> Result<Vec<String>, McpError> {
        let (mut cursor, columns) = self.run(&sql).await?;
        let name_at = require_column(&columns, "name")?;

        let mut names = Vec::new();
        while let Some(row) = cursor.next_row().await.map_err(McpError::RowScanFailed)? {
            names.push(text_cell(&row, name_at, "name")?);
        }
        Ok(names)
    }

    /// Column rows of a `DESCRIBE TABLE` result.
    async fn describe(&self, sql: String) -> Result<Vec<ColumnDescriptor>, McpError> {
        let (mut cursor, columns) = self.run(&sql).await?;
        let name_at = require_column(&columns, "name")?;
        let type_at = require_column(&columns, "type")?;
        let kind_at = require_column(&columns, "kind")?;

        let mut described = Vec::new();
        while let Some(row) = cursor.next_row().await.map_err(McpError::RowScanFailed)? {
            // constraints and other non-column rows
            if row.get(kind_at).and_then(CellValue::as_str) != Some("COLUMN") {
                continue;
            }
            described.push(ColumnDescriptor {
                name: text_cell(&row, name_at, "name")?,
                type_name: text_cell(&row, type_at, "type")?,
            });
        }
        Ok(described)
    }
}

fn contents(names: Vec<String>, child: impl Fn(&str) -> Locator) -> Vec<ResourceContents> {
    names
        .into_iter()
        .map(|name| {
            CatalogEntry {
                locator: child(&name),
                name,
            }
            .into_contents()
        })
        .collect()
}

fn mismatch(uri: &str, expected: &str) -> McpError {
    LocatorError::new(uri, format!("does not address a {expected}")).into()
}

fn require_column(columns: &[ColumnMeta], name: &str) -> Result<usize, McpError> {
    column_index(columns, name).ok_or_else(|| {
        McpError::RowScanFailed(WarehouseError::Metadata(format!(
            "result has no '{name}' column"
        )))
    })
}

fn text_cell(row: &[CellValue], index: usize, column: &str) -> Result<String, McpError> {
    match row.get(index) {
        Some(CellValue::String(s)) => Ok(s.clone()),
        other => Err(McpError::RowScanFailed(WarehouseError::Decode {
            column: column.to_string(),
            type_name: "TEXT".to_string(),
            reason: format!("expected text, got {other:?}"),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use snowcat_warehouse::memory::{MemoryWarehouse, ResultSet};

    fn describe_set() -> ResultSet {
        ResultSet::new(vec![
            ColumnMeta::new("name", "TEXT"),
            ColumnMeta::new("type", "TEXT"),
            ColumnMeta::new("kind", "TEXT"),
            ColumnMeta::new("null?", "TEXT"),
        ])
        .row(vec!["ID".into(), "NUMBER(38,0)".into(), "COLUMN".into(), "N".into()])
        .row(vec!["PK_ORDERS".into(), "PRIMARY KEY".into(), "CONSTRAINT".into(), "N".into()])
        .row(vec!["AMOUNT".into(), "NUMBER(12,2)".into(), "COLUMN".into(), "Y".into()])
    }

    fn router(warehouse: MemoryWarehouse) -> (ResourceRouter, Arc<MemoryWarehouse>) {
        let warehouse = Arc::new(warehouse);
        (ResourceRouter::new(warehouse.clone()), warehouse)
    }

    fn uris(contents: &[ResourceContents]) -> Vec<&str> {
        contents.iter().map(|c| c.uri.as_str()).collect()
    }

    #[tokio::test]
    async fn test_list_databases() {
        let (router, warehouse) = router(
            MemoryWarehouse::new()
                .with_result("SHOW TERSE DATABASES", ResultSet::names(&["ANALYTICS", "RAW"])),
        );

        let contents = router.read("snowflake://").await.unwrap();
        assert_eq!(
            contents,
            vec![
                ResourceContents {
                    uri: "snowflake://ANALYTICS".to_string(),
                    mime_type: "text/plain".to_string(),
                    text: "ANALYTICS".to_string(),
                },
                ResourceContents {
                    uri: "snowflake://RAW".to_string(),
                    mime_type: "text/plain".to_string(),
                    text: "RAW".to_string(),
                },
            ]
        );
        assert_eq!(warehouse.issued(), vec!["SHOW TERSE DATABASES"]);
    }

    #[tokio::test]
    async fn test_list_schemas() {
        let (router, warehouse) = router(MemoryWarehouse::new().with_result(
            "SHOW TERSE SCHEMAS IN DATABASE ANALYTICS",
            ResultSet::names(&["INFORMATION_SCHEMA", "PUBLIC"]),
        ));

        let contents = router.read("snowflake://ANALYTICS").await.unwrap();
        assert_eq!(
            uris(&contents),
            vec![
                "snowflake://ANALYTICS/INFORMATION_SCHEMA",
                "snowflake://ANALYTICS/PUBLIC"
            ]
        );
        assert_eq!(warehouse.issued(), vec!["SHOW TERSE SCHEMAS IN DATABASE ANALYTICS"]);
    }

    #[tokio::test]
    async fn test_list_collections_issues_no_sql() {
        let (router, warehouse) = router(MemoryWarehouse::new());

        let contents = router.read("snowflake://ANALYTICS/PUBLIC").await.unwrap();
        assert_eq!(
            uris(&contents),
            vec![
                "snowflake://ANALYTICS/PUBLIC/tables",
                "snowflake://ANALYTICS/PUBLIC/views"
            ]
        );
        assert!(warehouse.issued().is_empty());
    }

    #[tokio::test]
    async fn test_tables_and_views_share_a_statement() {
        let sql = "SHOW TERSE TABLES IN SCHEMA ANALYTICS.PUBLIC";
        let (router, warehouse) = router(
            MemoryWarehouse::new().with_result(sql, ResultSet::names(&["ORDERS", "CUSTOMERS"])),
        );

        let tables = router.read("snowflake://ANALYTICS/PUBLIC/tables").await.unwrap();
        let views = router.read("snowflake://ANALYTICS/PUBLIC/views").await.unwrap();

        assert_eq!(
            uris(&tables),
            vec![
                "snowflake://ANALYTICS/PUBLIC/table/ORDERS",
                "snowflake://ANALYTICS/PUBLIC/table/CUSTOMERS"
            ]
        );
        assert_eq!(
            uris(&views),
            vec![
                "snowflake://ANALYTICS/PUBLIC/view/ORDERS",
                "snowflake://ANALYTICS/PUBLIC/view/CUSTOMERS"
            ]
        );
        assert_eq!(warehouse.issued(), vec![sql, sql]);
    }

    #[tokio::test]
    async fn test_listed_children_parse_back() {
        let (router, _) = router(
            MemoryWarehouse::new()
                .with_result("SHOW TERSE DATABASES", ResultSet::names(&["tables", "A_B"])),
        );

        for entry in router.read("snowflake://").await.unwrap() {
            assert_eq!(
                Locator::parse(&entry.uri).unwrap(),
                Locator::database(entry.text)
            );
        }
    }

    #[tokio::test]
    async fn test_describe_keeps_only_columns() {
        let (router, warehouse) = router(
            MemoryWarehouse::new().with_result("DESCRIBE TABLE ANALYTICS.PUBLIC.ORDERS", describe_set()),
        );

        let contents = router
            .read("snowflake://ANALYTICS/PUBLIC/table/ORDERS")
            .await
            .unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].uri, "snowflake://ANALYTICS/PUBLIC/table/ORDERS");
        assert_eq!(contents[0].mime_type, "application/json");

        let document: serde_json::Value = serde_json::from_str(&contents[0].text).unwrap();
        assert_eq!(
            document,
            serde_json::json!({
                "columns": [
                    {"name": "ID", "type": "NUMBER(38,0)"},
                    {"name": "AMOUNT", "type": "NUMBER(12,2)"}
                ]
            })
        );
        assert_eq!(warehouse.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_view_definition_uses_describe_table() {
        let (router, warehouse) = router(
            MemoryWarehouse::new().with_result("DESCRIBE TABLE ANALYTICS.PUBLIC.V_ORDERS", describe_set()),
        );

        router
            .read("snowflake://ANALYTICS/PUBLIC/view/V_ORDERS")
            .await
            .unwrap();
        assert_eq!(warehouse.issued(), vec!["DESCRIBE TABLE ANALYTICS.PUBLIC.V_ORDERS"]);
    }

    #[tokio::test]
    async fn test_describe_with_no_columns_is_an_empty_array() {
        let set = ResultSet::new(vec![
            ColumnMeta::new("name", "TEXT"),
            ColumnMeta::new("type", "TEXT"),
            ColumnMeta::new("kind", "TEXT"),
        ]);
        let (router, _) =
            router(MemoryWarehouse::new().with_result("DESCRIBE TABLE D.S.T", set));

        let contents = router.read("snowflake://D/S/table/T").await.unwrap();
        assert_eq!(contents[0].text, "{\n \"columns\": []\n}\n");
    }

    #[tokio::test]
    async fn test_invalid_locators_issue_no_sql() {
        let (router, warehouse) = router(MemoryWarehouse::new());

        for uri in [
            "snowflake:///",
            "snowflake://DB/SC/indexes",
            "snowflake://DB/SC/table/",
            "mysql://DB",
        ] {
            let err = router.read(uri).await.unwrap_err();
            assert!(matches!(err, McpError::InvalidLocator(_)), "{uri}: {err}");
        }
        assert!(warehouse.issued().is_empty());
    }

    #[tokio::test]
    async fn test_handlers_revalidate_their_shape() {
        let (router, warehouse) = router(MemoryWarehouse::new());

        assert!(matches!(
            router.list_databases("snowflake://DB").await,
            Err(McpError::InvalidLocator(_))
        ));
        assert!(matches!(
            router.list_views("snowflake://DB/SC/tables").await,
            Err(McpError::InvalidLocator(_))
        ));
        assert!(matches!(
            router.describe_object("snowflake://DB/SC").await,
            Err(McpError::InvalidLocator(_))
        ));
        assert!(matches!(
            router.list_collections("snowflake://DB/SC/views"),
            Err(McpError::InvalidLocator(_))
        ));
        assert!(warehouse.issued().is_empty());
    }

    #[tokio::test]
    async fn test_warehouse_failure_names_the_statement() {
        let (router, _) = router(
            MemoryWarehouse::new()
                .with_query_error("SHOW TERSE SCHEMAS IN DATABASE NOPE", "Database 'NOPE' does not exist"),
        );

        let err = router.read("snowflake://NOPE").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to run query 'SHOW TERSE SCHEMAS IN DATABASE NOPE': Database 'NOPE' does not exist"
        );
    }

    #[tokio::test]
    async fn test_row_failure_discards_partial_listing() {
        let (router, warehouse) = router(MemoryWarehouse::new().with_row_error(
            "SHOW TERSE DATABASES",
            ResultSet::names(&["A", "B", "C"]),
            2,
            "connection reset",
        ));

        let err = router.read("snowflake://").await.unwrap_err();
        assert!(matches!(err, McpError::RowScanFailed(_)));
        assert_eq!(warehouse.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_listing_without_name_column() {
        let set = ResultSet::new(vec![ColumnMeta::new("created_on", "TIMESTAMP_LTZ")]);
        let (router, _) = router(MemoryWarehouse::new().with_result("SHOW TERSE DATABASES", set));

        assert!(matches!(
            router.read("snowflake://").await,
            Err(McpError::RowScanFailed(_))
        ));
    }

    #[test]
    fn test_published_registrations() {
        let (router, _) = router(MemoryWarehouse::new());

        let resources = router.resources();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].uri, "snowflake://");

        let templates = router.templates();
        let definitions: Vec<_> = templates
            .iter()
            .filter(|t| t.mime_type == "application/json")
            .map(|t| t.uri_template.as_str())
            .collect();
        assert_eq!(
            definitions,
            vec![
                "snowflake://{database-name}/{schema-name}/table/{table-name}",
                "snowflake://{database-name}/{schema-name}/view/{table-name}"
            ]
        );
    }
}
