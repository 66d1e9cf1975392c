//! Dynamically typed result values.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::{Serialize, Serializer};

/// A single value from a result row.
///
/// This is the closed set of shapes the warehouse surfaces. No type beyond
/// the column's declared type name is carried; the value is rendered as the
/// closest JSON scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Dates, times and timestamps, already rendered as text.
    Timestamp(String),
}

impl CellValue {
    /// Borrow the value as text when it is textual.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) | CellValue::Timestamp(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            CellValue::Integer(i) => serializer.serialize_i64(*i),
            // JSON has no NaN or infinity
            CellValue::Float(f) if !f.is_finite() => serializer.serialize_str(&f.to_string()),
            CellValue::Float(f) => serializer.serialize_f64(*f),
            CellValue::String(s) | CellValue::Timestamp(s) => serializer.serialize_str(s),
            CellValue::Bytes(b) => serializer.serialize_str(&B64.encode(b)),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Integer(i)
    }
}

impl From<f64> for CellValue {
    fn from(f: f64) -> Self {
        CellValue::Float(f)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars_serialize_as_json_scalars() {
        let row = vec![
            CellValue::Null,
            CellValue::Bool(true),
            CellValue::Integer(42),
            CellValue::Float(1.5),
            CellValue::from("text"),
            CellValue::Timestamp("2024-01-02T03:04:05Z".to_string()),
        ];
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            json!([null, true, 42, 1.5, "text", "2024-01-02T03:04:05Z"])
        );
    }

    #[test]
    fn test_bytes_serialize_as_base64() {
        let value = CellValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(serde_json::to_value(&value).unwrap(), json!("3q2+7w=="));
    }

    #[test]
    fn test_non_finite_float_serializes_as_text() {
        assert_eq!(
            serde_json::to_value(CellValue::Float(f64::NAN)).unwrap(),
            json!("NaN")
        );
        assert_eq!(
            serde_json::to_value(CellValue::Float(f64::NEG_INFINITY)).unwrap(),
            json!("-inf")
        );
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(CellValue::from(None::<i64>), CellValue::Null);
        assert_eq!(CellValue::from(Some(7i64)), CellValue::Integer(7));
    }
}
