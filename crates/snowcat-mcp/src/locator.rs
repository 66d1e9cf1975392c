//! Catalog resource locators.
//!
//! A locator addresses one node of the catalog tree:
//!
//! ```text
//! snowflake://                                  databases
//! snowflake://<db>                              schemas in <db>
//! snowflake://<db>/<schema>                     the tables and views collections
//! snowflake://<db>/<schema>/tables              tables in <db>.<schema>
//! snowflake://<db>/<schema>/views               views in <db>.<schema>
//! snowflake://<db>/<schema>/table/<name>        columns of a table
//! snowflake://<db>/<schema>/view/<name>         columns of a view
//! ```
//!
//! Every child locator is its parent plus one segment, so anything this
//! module renders parses back to the same variant.
//!
//! Segments are taken verbatim: no percent-decoding and no quoting. The
//! names that flow through here come from earlier catalog listings and are
//! interpolated into catalog statements as-is, because Snowflake's `SHOW`
//! and `DESCRIBE` commands have no bind parameters for identifiers.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// URI scheme of every catalog locator.
pub const SCHEME: &str = "snowflake";

const PREFIX: &str = "snowflake://";

/// A locator string that does not address a catalog object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid URI '{uri}': {reason}")]
pub struct LocatorError {
    pub uri: String,
    pub reason: String,
}

impl LocatorError {
    pub(crate) fn new(uri: &str, reason: impl Into<String>) -> Self {
        Self {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }
}

/// Table or view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Table,
    View,
}

impl ObjectKind {
    /// Path segment naming one object of this kind.
    pub fn segment(self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::View => "view",
        }
    }

    /// Path segment naming the collection of this kind.
    pub fn collection(self) -> &'static str {
        match self {
            ObjectKind::Table => "tables",
            ObjectKind::View => "views",
        }
    }
}

/// A parsed catalog locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Root,
    Database {
        database: String,
    },
    Schema {
        database: String,
        schema: String,
    },
    Collection {
        database: String,
        schema: String,
        kind: ObjectKind,
    },
    Object {
        database: String,
        schema: String,
        kind: ObjectKind,
        name: String,
    },
}

impl Locator {
    pub fn database(database: impl Into<String>) -> Self {
        Locator::Database {
            database: database.into(),
        }
    }

    pub fn schema(database: impl Into<String>, schema: impl Into<String>) -> Self {
        Locator::Schema {
            database: database.into(),
            schema: schema.into(),
        }
    }

    pub fn collection(
        database: impl Into<String>,
        schema: impl Into<String>,
        kind: ObjectKind,
    ) -> Self {
        Locator::Collection {
            database: database.into(),
            schema: schema.into(),
            kind,
        }
    }

    pub fn object(
        database: impl Into<String>,
        schema: impl Into<String>,
        kind: ObjectKind,
        name: impl Into<String>,
    ) -> Self {
        Locator::Object {
            database: database.into(),
            schema: schema.into(),
            kind,
            name: name.into(),
        }
    }

    /// Parse a locator string.
    pub fn parse(uri: &str) -> Result<Self, LocatorError> {
        let path = uri
            .strip_prefix(PREFIX)
            .ok_or_else(|| LocatorError::new(uri, format!("expected a {PREFIX} locator")))?;
        if path.is_empty() {
            return Ok(Locator::Root);
        }

        let segments: Vec<&str> = path.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(LocatorError::new(uri, "empty path segment"));
        }

        match segments.as_slice() {
            [database] => Ok(Locator::database(*database)),
            [database, schema] => Ok(Locator::schema(*database, *schema)),
            [database, schema, "tables"] => {
                Ok(Locator::collection(*database, *schema, ObjectKind::Table))
            }
            [database, schema, "views"] => {
                Ok(Locator::collection(*database, *schema, ObjectKind::View))
            }
            [_, _, other] => Err(LocatorError::new(
                uri,
                format!("unknown collection '{other}', expected 'tables' or 'views'"),
            )),
            [database, schema, "table", name] => {
                Ok(Locator::object(*database, *schema, ObjectKind::Table, *name))
            }
            [database, schema, "view", name] => {
                Ok(Locator::object(*database, *schema, ObjectKind::View, *name))
            }
            [_, _, other, _] => Err(LocatorError::new(
                uri,
                format!("unknown object kind '{other}', expected 'table' or 'view'"),
            )),
            _ => Err(LocatorError::new(uri, "too many path segments")),
        }
    }
}

impl FromStr for Locator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Locator::parse(s)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(PREFIX)?;
        match self {
            Locator::Root => Ok(()),
            Locator::Database { database } => write!(f, "{database}"),
            Locator::Schema { database, schema } => write!(f, "{database}/{schema}"),
            Locator::Collection {
                database,
                schema,
                kind,
            } => write!(f, "{database}/{schema}/{}", kind.collection()),
            Locator::Object {
                database,
                schema,
                kind,
                name,
            } => write!(f, "{database}/{schema}/{}/{name}", kind.segment()),
        }
    }
}
