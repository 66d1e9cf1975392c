//! # snowcat-warehouse
//!
//! The warehouse connection used by Snowcat. It exposes two seams:
//!
//! - [`Warehouse`]: run one SQL statement and get a [`RowCursor`] back.
//! - [`RowCursor`]: column metadata plus rows pulled one at a time.
//!
//! [`SnowflakeWarehouse`] implements them over Snowflake's REST API,
//! authenticating once through the external-browser SSO flow. Result
//! chunks are downloaded lazily, so a caller that stops reading early never
//! fetches the rest of a large result.
//!
//! With the `testing` feature, [`memory::MemoryWarehouse`] serves canned
//! result sets instead.

pub mod connection;
pub mod error;
pub mod snowflake;
pub mod value;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use connection::{ColumnMeta, RowCursor, Warehouse, column_index};
pub use error::WarehouseError;
pub use snowflake::SnowflakeWarehouse;
pub use value::CellValue;
