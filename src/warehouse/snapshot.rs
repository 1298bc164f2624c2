use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::fmt;

/// Column type as seen by the normalizer, decided once during introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Decimal { scale: u32 },
    Integer,
    Float,
    Boolean,
    Text,
    Date,
    Time,
    Timestamp,
}

impl ColumnKind {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnKind::Decimal { .. } | ColumnKind::Integer | ColumnKind::Float
        )
    }

    /// Fixed-point column that can only hold whole numbers.
    pub fn is_integral_decimal(&self) -> bool {
        matches!(self, ColumnKind::Decimal { scale: 0 })
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            ColumnKind::Date | ColumnKind::Time | ColumnKind::Timestamp
        )
    }

    pub fn sql_name(&self) -> String {
        match self {
            ColumnKind::Decimal { scale } => format!("NUMBER(38,{})", scale),
            ColumnKind::Integer => "INTEGER".to_string(),
            ColumnKind::Float => "FLOAT".to_string(),
            ColumnKind::Boolean => "BOOLEAN".to_string(),
            ColumnKind::Text => "VARCHAR".to_string(),
            ColumnKind::Date => "DATE".to_string(),
            ColumnKind::Time => "TIME".to_string(),
            ColumnKind::Timestamp => "TIMESTAMP_NTZ".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    /// Missing date/time value.
    NullTime,
    /// Wide enough for any `NUMBER(38,0)`.
    Integer(i128),
    Float(f64),
    Decimal(Decimal),
    Boolean(bool),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl RawValue {
    pub fn is_missing(&self) -> bool {
        match self {
            RawValue::Null | RawValue::NullTime => true,
            RawValue::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RawValue::Null => "NULL",
            RawValue::NullTime => "NULL_TIME",
            RawValue::Integer(_) => "INTEGER",
            RawValue::Float(_) => "FLOAT",
            RawValue::Decimal(_) => "DECIMAL",
            RawValue::Boolean(_) => "BOOLEAN",
            RawValue::Text(_) => "TEXT",
            RawValue::Date(_) => "DATE",
            RawValue::Time(_) => "TIME",
            RawValue::Timestamp(_) => "TIMESTAMP",
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null | RawValue::NullTime => write!(f, "NULL"),
            RawValue::Integer(i) => write!(f, "{}", i),
            RawValue::Float(v) => write!(f, "{}", v),
            RawValue::Decimal(d) => write!(f, "{}", d),
            RawValue::Boolean(b) => write!(f, "{}", b),
            RawValue::Text(s) => write!(f, "{}", s),
            RawValue::Date(d) => write!(f, "{}", d),
            RawValue::Time(t) => write!(f, "{}", t),
            RawValue::Timestamp(ts) => write!(f, "{}", ts),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Rows of a table read from the warehouse. Values in each row line up with
/// `columns`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSnapshot {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<RawValue>>,
}

impl TableSnapshot {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<RawValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&RawValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Serialized fixture rows ready for a bulk insert. `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl InsertBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_values() {
        assert!(RawValue::Null.is_missing());
        assert!(RawValue::NullTime.is_missing());
        assert!(RawValue::Float(f64::NAN).is_missing());
        assert!(!RawValue::Float(0.0).is_missing());
        assert!(!RawValue::Text(String::new()).is_missing());
    }

    #[test]
    fn test_kind_classification() {
        assert!(ColumnKind::Decimal { scale: 0 }.is_integral_decimal());
        assert!(!ColumnKind::Decimal { scale: 2 }.is_integral_decimal());
        assert!(ColumnKind::Float.is_numeric());
        assert!(!ColumnKind::Text.is_numeric());
        assert!(ColumnKind::Timestamp.is_temporal());
    }

    #[test]
    fn test_snapshot_value_lookup() {
        let snapshot = TableSnapshot::new(
            vec![
                Column::new("id", ColumnKind::Integer),
                Column::new("name", ColumnKind::Text),
            ],
            vec![vec![RawValue::Integer(1), RawValue::Text("a".to_string())]],
        );
        assert_eq!(
            snapshot.value(0, "name"),
            Some(&RawValue::Text("a".to_string()))
        );
        assert_eq!(snapshot.value(0, "missing"), None);
        assert_eq!(snapshot.value(1, "id"), None);
    }
}
