//! Decoding of JSON-format result values.
//!
//! In the JSON result format every value arrives as a string (or null) and
//! its meaning depends on the column type: numbers are decimal text, dates
//! are days since the epoch, timestamps are `seconds.fraction` since the
//! epoch with an optional trailing offset in minutes biased by 1440.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, SecondsFormat, Utc};

use crate::connection::ColumnMeta;
use crate::error::WarehouseError;
use crate::value::CellValue;

use super::wire::RowType;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Column metadata as exposed to callers: Snowflake's type name upper-cased.
pub(crate) fn column_meta(row_type: &RowType) -> ColumnMeta {
    ColumnMeta::new(&row_type.name, row_type.type_name.to_uppercase())
}

/// Decode one raw value of a column.
pub(crate) fn decode_cell(raw: Option<&str>, row_type: &RowType) -> Result<CellValue, WarehouseError> {
    let Some(raw) = raw else {
        return Ok(CellValue::Null);
    };

    let fail = |reason: String| WarehouseError::Decode {
        column: row_type.name.clone(),
        type_name: row_type.type_name.to_uppercase(),
        reason,
    };

    match row_type.type_name.to_ascii_lowercase().as_str() {
        "fixed" => {
            // Scaled and out-of-range NUMBER values stay exact as decimal text
            if row_type.scale.unwrap_or(0) == 0 {
                if let Ok(n) = raw.parse::<i64>() {
                    return Ok(CellValue::Integer(n));
                }
            }
            if !is_decimal(raw) {
                return Err(fail(format!("not a decimal: {raw}")));
            }
            Ok(CellValue::String(raw.to_string()))
        }
        "real" => raw
            .parse::<f64>()
            .map(CellValue::Float)
            .map_err(|e| fail(e.to_string())),
        "boolean" => match raw {
            "1" | "true" | "TRUE" => Ok(CellValue::Bool(true)),
            "0" | "false" | "FALSE" => Ok(CellValue::Bool(false)),
            other => Err(fail(format!("not a boolean: {other}"))),
        },
        "binary" => decode_hex(raw).map(CellValue::Bytes).map_err(fail),
        "date" => {
            let days: i64 = raw.parse().map_err(|e: std::num::ParseIntError| fail(e.to_string()))?;
            let date = NaiveDate::from_ymd_opt(1970, 1, 1)
                .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(days)))
                .ok_or_else(|| fail(format!("date out of range: {raw}")))?;
            Ok(CellValue::Timestamp(date.format("%Y-%m-%d").to_string()))
        }
        "time" => {
            let (secs, nanos) = split_epoch(raw).map_err(fail)?;
            let time = u32::try_from(secs)
                .ok()
                .and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, nanos))
                .ok_or_else(|| fail(format!("time out of range: {raw}")))?;
            Ok(CellValue::Timestamp(time.format("%H:%M:%S%.f").to_string()))
        }
        "timestamp_ntz" => {
            let utc = timestamp(raw).map_err(fail)?;
            Ok(CellValue::Timestamp(
                utc.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            ))
        }
        "timestamp_ltz" => {
            let utc = timestamp(raw).map_err(fail)?;
            Ok(CellValue::Timestamp(
                utc.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ))
        }
        "timestamp_tz" => {
            let (epoch, offset) = raw
                .split_once(' ')
                .ok_or_else(|| fail(format!("missing time zone offset: {raw}")))?;
            let utc = timestamp(epoch).map_err(fail)?;
            let minutes: i32 = offset
                .parse()
                .map_err(|e: std::num::ParseIntError| fail(e.to_string()))?;
            let zone = FixedOffset::east_opt((minutes - 1440) * 60)
                .ok_or_else(|| fail(format!("offset out of range: {offset}")))?;
            Ok(CellValue::Timestamp(
                utc.with_timezone(&zone)
                    .to_rfc3339_opts(SecondsFormat::AutoSi, false),
            ))
        }
        // text, variant, object, array, geography and anything newer
        _ => Ok(CellValue::String(raw.to_string())),
    }
}

fn is_decimal(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    !whole.is_empty()
        && whole.bytes().all(|b| b.is_ascii_digit())
        && fraction.bytes().all(|b| b.is_ascii_digit())
}

fn timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let (secs, nanos) = split_epoch(raw)?;
    DateTime::from_timestamp(secs, nanos).ok_or_else(|| format!("timestamp out of range: {raw}"))
}

/// Split `[-]seconds[.fraction]` into whole seconds and non-negative nanos.
fn split_epoch(raw: &str) -> Result<(i64, u32), String> {
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() || fraction.len() > 9 {
        return Err(format!("malformed epoch value: {raw}"));
    }

    let whole: i128 = whole
        .parse()
        .map_err(|_| format!("malformed epoch value: {raw}"))?;
    let fraction: i128 = if fraction.is_empty() {
        0
    } else {
        format!("{fraction:0<9}")
            .parse()
            .map_err(|_| format!("malformed epoch value: {raw}"))?
    };

    let mut total = whole * NANOS_PER_SEC + fraction;
    if negative {
        total = -total;
    }
    let secs = i64::try_from(total.div_euclid(NANOS_PER_SEC))
        .map_err(|_| format!("epoch value out of range: {raw}"))?;
    let nanos = total.rem_euclid(NANOS_PER_SEC) as u32;
    Ok((secs, nanos))
}

fn decode_hex(raw: &str) -> Result<Vec<u8>, String> {
    if raw.len() % 2 != 0 {
        return Err("odd number of hex digits".to_string());
    }
    (0..raw.len())
        .step_by(2)
        .map(|i| {
            raw.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex at offset {i}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn col(type_name: &str, scale: Option<i64>) -> RowType {
        RowType {
            name: "C".to_string(),
            type_name: type_name.to_string(),
            scale,
        }
    }

    #[test]
    fn test_null_for_every_type() {
        for t in ["fixed", "text", "boolean", "timestamp_tz"] {
            assert_eq!(decode_cell(None, &col(t, None)).unwrap(), CellValue::Null);
        }
    }

    #[test]
    fn test_fixed() {
        assert_eq!(
            decode_cell(Some("1"), &col("fixed", Some(0))).unwrap(),
            CellValue::Integer(1)
        );
        assert_eq!(
            decode_cell(Some("12.50"), &col("fixed", Some(2))).unwrap(),
            CellValue::String("12.50".to_string())
        );
        assert_eq!(
            decode_cell(Some("99999999999999999999999"), &col("fixed", Some(0))).unwrap(),
            CellValue::String("99999999999999999999999".to_string())
        );
    }

    #[test]
    fn test_scaled_fixed_keeps_every_digit() {
        let value = decode_cell(Some("12345678901234567.89"), &col("fixed", Some(2))).unwrap();
        assert_eq!(value, CellValue::String("12345678901234567.89".to_string()));
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            serde_json::json!("12345678901234567.89")
        );
        assert_eq!(
            decode_cell(Some("-0.001"), &col("fixed", Some(3))).unwrap(),
            CellValue::String("-0.001".to_string())
        );
        assert!(decode_cell(Some("1e5"), &col("fixed", Some(2))).is_err());
    }

    #[test]
    fn test_boolean() {
        assert_eq!(
            decode_cell(Some("1"), &col("boolean", None)).unwrap(),
            CellValue::Bool(true)
        );
        assert!(decode_cell(Some("maybe"), &col("boolean", None)).is_err());
    }

    #[test]
    fn test_binary() {
        assert_eq!(
            decode_cell(Some("DEADBEEF"), &col("binary", None)).unwrap(),
            CellValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef])
        );
        assert!(decode_cell(Some("ABC"), &col("binary", None)).is_err());
    }

    #[test]
    fn test_date_and_time() {
        assert_eq!(
            decode_cell(Some("19723"), &col("date", None)).unwrap(),
            CellValue::Timestamp("2024-01-01".to_string())
        );
        assert_eq!(
            decode_cell(Some("3723.5"), &col("time", Some(9))).unwrap(),
            CellValue::Timestamp("01:02:03.500".to_string())
        );
    }

    #[test]
    fn test_timestamps() {
        assert_eq!(
            decode_cell(Some("1704067200.000000000"), &col("timestamp_ntz", Some(9))).unwrap(),
            CellValue::Timestamp("2024-01-01T00:00:00".to_string())
        );
        assert_eq!(
            decode_cell(Some("1704067200.250000000"), &col("timestamp_ltz", Some(9))).unwrap(),
            CellValue::Timestamp("2024-01-01T00:00:00.250Z".to_string())
        );
        // 1440 + 60 = UTC+01:00
        assert_eq!(
            decode_cell(Some("1704067200.000000000 1500"), &col("timestamp_tz", Some(9)))
                .unwrap(),
            CellValue::Timestamp("2024-01-01T01:00:00+01:00".to_string())
        );
    }

    #[test]
    fn test_negative_epoch() {
        assert_eq!(split_epoch("-1.5").unwrap(), (-2, 500_000_000));
        assert_eq!(split_epoch("-2").unwrap(), (-2, 0));
        assert!(split_epoch("abc").is_err());
    }

    #[test]
    fn test_text_passthrough() {
        assert_eq!(
            decode_cell(Some("{\"a\": 1}"), &col("variant", None)).unwrap(),
            CellValue::String("{\"a\": 1}".to_string())
        );
    }

    #[test]
    fn test_column_meta_uppercases_type() {
        assert_eq!(column_meta(&col("fixed", Some(0))).type_name, "FIXED");
    }
}
