//! Canonical string form of warehouse tables.
//!
//! Tables read back from the warehouse are compared against hand-written
//! fixtures as strings. Rendering goes column by column:
//!
//! 1. zero-scale decimal columns are truncated to whole numbers, keeping
//!    missing cells missing;
//! 2. numeric columns render with four decimal places;
//! 3. null, missing date/time and NaN cells become [`NULL_TOKEN`], every other
//!    cell renders through `Display`.

mod format;

pub use format::{format_fixed, format_float, format_wide_integer, NULL_TOKEN};

use crate::error::{HarnessError, Result};
use crate::warehouse::{Column, RawValue, TableSnapshot};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

/// Canonical cells of one table, column by column, in input row order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalTable {
    pub columns: Vec<String>,
    pub cells: HashMap<String, Vec<String>>,
    pub row_count: usize,
}

impl CanonicalTable {
    pub fn column(&self, name: &str) -> Option<&[String]> {
        self.cells.get(name).map(Vec::as_slice)
    }

    pub fn records(&self) -> Vec<BTreeMap<String, String>> {
        (0..self.row_count)
            .map(|row| {
                self.columns
                    .iter()
                    .filter_map(|name| {
                        self.cells
                            .get(name)
                            .and_then(|cells| cells.get(row))
                            .map(|cell| (name.clone(), cell.clone()))
                    })
                    .collect()
            })
            .collect()
    }

    pub fn into_actuals(self) -> Actuals {
        Actuals {
            records: self.records(),
            columns: self.columns,
        }
    }
}

/// A target table as handed to the expectation checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actuals {
    pub records: Vec<BTreeMap<String, String>>,
    pub columns: Vec<String>,
}

pub fn normalize(snapshot: &TableSnapshot) -> Result<CanonicalTable> {
    let mut cells = HashMap::with_capacity(snapshot.columns.len());
    for (idx, column) in snapshot.columns.iter().enumerate() {
        let values = snapshot
            .rows
            .iter()
            .enumerate()
            .map(|(row, values)| {
                let value = values.get(idx).unwrap_or(&RawValue::Null);
                canonical_cell(column, row, value)
            })
            .collect::<Result<Vec<String>>>()?;
        cells.insert(column.name.clone(), values);
    }

    Ok(CanonicalTable {
        columns: snapshot.columns.iter().map(|c| c.name.clone()).collect(),
        cells,
        row_count: snapshot.rows.len(),
    })
}

fn canonical_cell(column: &Column, row: usize, value: &RawValue) -> Result<String> {
    if value.is_missing() {
        return Ok(NULL_TOKEN.to_string());
    }

    if column.kind.is_numeric() {
        return Ok(match numeric_value(column, row, value)? {
            Some(n) if column.kind.is_integral_decimal() => n.truncated().render(),
            Some(n) => n.render(),
            None => NULL_TOKEN.to_string(),
        });
    }

    Ok(value.to_string())
}

enum Numeric {
    Exact(Decimal),
    Float(f64),
    /// Whole number beyond `Decimal`'s 96-bit mantissa.
    Wide(i128),
}

impl Numeric {
    fn truncated(self) -> Numeric {
        match self {
            Numeric::Exact(d) => Numeric::Exact(d.trunc()),
            Numeric::Float(f) => match Decimal::from_f64_retain(f.trunc()) {
                Some(d) => Numeric::Exact(d.trunc()),
                None => Numeric::Float(f.trunc()),
            },
            Numeric::Wide(i) => Numeric::Wide(i),
        }
    }

    fn render(&self) -> String {
        match self {
            Numeric::Exact(d) => format_fixed(*d),
            Numeric::Float(f) => format_float(*f),
            Numeric::Wide(i) => format_wide_integer(*i),
        }
    }
}

/// Numeric reading of a cell in a numeric column; `None` when missing.
fn numeric_value(column: &Column, row: usize, value: &RawValue) -> Result<Option<Numeric>> {
    let type_error = |message: String| HarnessError::Type {
        column: column.name.clone(),
        row,
        message,
    };

    let numeric = match value {
        RawValue::Null | RawValue::NullTime => return Ok(None),
        RawValue::Float(f) if f.is_nan() => return Ok(None),
        RawValue::Integer(i) => match Decimal::try_from_i128_with_scale(*i, 0) {
            Ok(d) => Numeric::Exact(d),
            Err(_) => Numeric::Wide(*i),
        },
        RawValue::Decimal(d) => Numeric::Exact(*d),
        RawValue::Float(f) => Numeric::Float(*f),
        RawValue::Text(s) => parse_numeric_text(s).ok_or_else(|| {
            type_error(format!(
                "'{}' is not numeric in a {} column",
                s,
                column.kind.sql_name()
            ))
        })?,
        other => {
            return Err(type_error(format!(
                "{} value '{}' in a {} column",
                other.type_name(),
                other,
                column.kind.sql_name()
            )))
        }
    };
    Ok(Some(numeric))
}

fn parse_numeric_text(text: &str) -> Option<Numeric> {
    let text = text.trim();
    match Decimal::from_str(text) {
        Ok(d) => Some(Numeric::Exact(d)),
        Err(_) => text.parse::<i128>().ok().map(Numeric::Wide),
    }
}
