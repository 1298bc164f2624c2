use super::protocol::RowType;
use crate::error::{HarnessError, Result};
use crate::warehouse::snapshot::{Column, ColumnKind, RawValue};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

pub(super) fn column_kind(row_type: &RowType) -> ColumnKind {
    match row_type.type_name.to_ascii_lowercase().as_str() {
        "fixed" => ColumnKind::Decimal {
            scale: row_type.scale.unwrap_or(0).max(0) as u32,
        },
        "real" => ColumnKind::Float,
        "boolean" => ColumnKind::Boolean,
        "date" => ColumnKind::Date,
        "time" => ColumnKind::Time,
        "timestamp_ntz" | "timestamp_ltz" | "timestamp_tz" => ColumnKind::Timestamp,
        _ => ColumnKind::Text,
    }
}

pub(super) fn columns(row_types: &[RowType]) -> Vec<Column> {
    row_types
        .iter()
        .map(|rt| Column::new(rt.name.clone(), column_kind(rt)))
        .collect()
}

pub(super) fn decode_row(
    columns: &[Column],
    row_types: &[RowType],
    row: &[Option<String>],
) -> Result<Vec<RawValue>> {
    columns
        .iter()
        .zip(row_types)
        .enumerate()
        .map(|(idx, (column, row_type))| {
            let cell = row.get(idx).and_then(|c| c.as_deref());
            decode_value(column, &row_type.type_name, cell)
        })
        .collect()
}

fn decode_value(column: &Column, type_name: &str, cell: Option<&str>) -> Result<RawValue> {
    let Some(text) = cell else {
        return Ok(if column.kind.is_temporal() {
            RawValue::NullTime
        } else {
            RawValue::Null
        });
    };

    let malformed = || {
        HarnessError::Warehouse(format!(
            "malformed {} value '{}' in column '{}'",
            type_name, text, column.name
        ))
    };

    let value = match column.kind {
        ColumnKind::Decimal { scale } => match Decimal::from_str(text) {
            Ok(d) => RawValue::Decimal(d),
            // NUMBER(38,0) values past 28 digits
            Err(_) if scale == 0 => RawValue::Integer(text.parse().map_err(|_| malformed())?),
            Err(_) => return Err(malformed()),
        },
        ColumnKind::Integer => RawValue::Integer(text.parse().map_err(|_| malformed())?),
        ColumnKind::Float => RawValue::Float(text.parse().map_err(|_| malformed())?),
        ColumnKind::Boolean => match text {
            "1" | "true" | "TRUE" => RawValue::Boolean(true),
            "0" | "false" | "FALSE" => RawValue::Boolean(false),
            _ => return Err(malformed()),
        },
        ColumnKind::Text => RawValue::Text(text.to_string()),
        ColumnKind::Date => {
            let days: i64 = text.parse().map_err(|_| malformed())?;
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).ok_or_else(malformed)?;
            RawValue::Date(
                epoch
                    .checked_add_signed(Duration::days(days))
                    .ok_or_else(malformed)?,
            )
        }
        ColumnKind::Time => {
            let (secs, nanos) = split_epoch(text).ok_or_else(malformed)?;
            let secs = u32::try_from(secs).map_err(|_| malformed())?;
            RawValue::Time(
                NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
                    .ok_or_else(malformed)?,
            )
        }
        ColumnKind::Timestamp => {
            RawValue::Timestamp(decode_timestamp(type_name, text).ok_or_else(malformed)?)
        }
    };
    Ok(value)
}

/// `timestamp_tz` carries `<epoch> <offset + 1440 minutes>`; the others carry
/// only the epoch.
fn decode_timestamp(type_name: &str, text: &str) -> Option<NaiveDateTime> {
    let mut parts = text.split_whitespace();
    let (secs, nanos) = split_epoch(parts.next()?)?;
    let utc = DateTime::from_timestamp(secs, nanos)?.naive_utc();
    if type_name.eq_ignore_ascii_case("timestamp_tz") {
        if let Some(offset) = parts.next() {
            let minutes: i64 = offset.parse().ok()?;
            return utc.checked_add_signed(Duration::minutes(minutes - 1440));
        }
    }
    Some(utc)
}

fn split_epoch(text: &str) -> Option<(i64, u32)> {
    let value = Decimal::from_str(text).ok()?;
    let secs = value.floor();
    let nanos = ((value - secs) * Decimal::from(1_000_000_000)).trunc();
    Some((secs.to_i64()?, nanos.to_u32()?))
}
