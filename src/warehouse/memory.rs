use super::snapshot::{Column, ColumnKind, InsertBatch, RawValue, TableSnapshot};
use super::table_ref::TableRef;
use super::{Connection, Warehouse};
use crate::error::{HarnessError, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<TableRef, TableSnapshot>,
    insert_calls: usize,
    truncated: Vec<String>,
    open_connections: usize,
}

/// In-process warehouse. Clones share the same tables.
#[derive(Debug, Clone)]
pub struct MemoryWarehouse {
    default_schema: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryWarehouse {
    pub fn new(default_schema: impl Into<String>) -> Self {
        Self {
            default_schema: default_schema.into(),
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        lock_state(&self.state)
    }

    pub fn create_table(&self, table: TableRef, columns: Vec<Column>) -> Result<()> {
        self.lock()?
            .tables
            .insert(table, TableSnapshot::new(columns, Vec::new()));
        Ok(())
    }

    pub fn replace_rows(&self, table: &TableRef, rows: Vec<Vec<RawValue>>) -> Result<()> {
        let mut state = self.lock()?;
        let snapshot = state
            .tables
            .get_mut(table)
            .ok_or_else(|| HarnessError::TableNotFound(table.to_string()))?;
        snapshot.rows = rows;
        Ok(())
    }

    pub fn snapshot(&self, table: &TableRef) -> Result<Option<TableSnapshot>> {
        Ok(self.lock()?.tables.get(table).cloned())
    }

    pub fn insert_calls(&self) -> Result<usize> {
        Ok(self.lock()?.insert_calls)
    }

    pub fn truncated(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.truncated.clone())
    }

    pub fn open_connections(&self) -> Result<usize> {
        Ok(self.lock()?.open_connections)
    }
}

fn lock_state(state: &Mutex<MemoryState>) -> Result<MutexGuard<'_, MemoryState>> {
    state
        .lock()
        .map_err(|_| HarnessError::Warehouse("memory warehouse lock poisoned".to_string()))
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    fn default_schema(&self) -> &str {
        &self.default_schema
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        self.lock()?.open_connections += 1;
        Ok(Box::new(MemoryConnection {
            default_schema: self.default_schema.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct MemoryConnection {
    default_schema: String,
    state: Arc<Mutex<MemoryState>>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn truncate_table(&mut self, table: &str) -> Result<()> {
        let table_ref = TableRef::resolve(table, &self.default_schema);
        let mut state = lock_state(&self.state)?;
        state.truncated.push(table.to_string());
        if let Some(snapshot) = state.tables.get_mut(&table_ref) {
            snapshot.rows.clear();
        }
        Ok(())
    }

    async fn insert_rows(&mut self, table: &TableRef, batch: &InsertBatch) -> Result<u64> {
        let mut state = lock_state(&self.state)?;
        state.insert_calls += 1;
        let snapshot = state
            .tables
            .get_mut(table)
            .ok_or_else(|| HarnessError::TableNotFound(table.to_string()))?;

        let positions = batch
            .columns
            .iter()
            .map(|name| {
                snapshot.column_index(name).ok_or_else(|| {
                    HarnessError::Warehouse(format!(
                        "column '{}' does not exist in {}",
                        name, table
                    ))
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        let mut new_rows = Vec::with_capacity(batch.rows.len());
        for row in &batch.rows {
            let mut values: Vec<RawValue> = snapshot
                .columns
                .iter()
                .map(|c| null_for(c.kind))
                .collect();
            for (cell, &idx) in row.iter().zip(&positions) {
                let column = &snapshot.columns[idx];
                values[idx] = coerce(column, cell.as_deref())?;
            }
            new_rows.push(values);
        }

        let inserted = new_rows.len() as u64;
        snapshot.rows.extend(new_rows);
        debug!(table = %table, rows = inserted, "Inserted rows into memory table");
        Ok(inserted)
    }

    async fn read_table(&mut self, table: &TableRef) -> Result<TableSnapshot> {
        lock_state(&self.state)?
            .tables
            .get(table)
            .cloned()
            .ok_or_else(|| HarnessError::TableNotFound(table.to_string()))
    }

    async fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut state = lock_state(&self.state)?;
        state.open_connections = state.open_connections.saturating_sub(1);
        Ok(())
    }
}

fn null_for(kind: ColumnKind) -> RawValue {
    if kind.is_temporal() {
        RawValue::NullTime
    } else {
        RawValue::Null
    }
}

fn coerce(column: &Column, cell: Option<&str>) -> Result<RawValue> {
    let Some(text) = cell else {
        return Ok(null_for(column.kind));
    };

    let cast_error = || {
        HarnessError::Warehouse(format!(
            "cannot cast '{}' to {} for column '{}'",
            text,
            column.kind.sql_name(),
            column.name
        ))
    };

    let value = match column.kind {
        ColumnKind::Decimal { scale } => match Decimal::from_str(text.trim()) {
            Ok(d) => RawValue::Decimal(d),
            Err(_) if scale == 0 => {
                RawValue::Integer(text.trim().parse().map_err(|_| cast_error())?)
            }
            Err(_) => return Err(cast_error()),
        },
        ColumnKind::Integer => RawValue::Integer(text.trim().parse().map_err(|_| cast_error())?),
        ColumnKind::Float => RawValue::Float(text.trim().parse().map_err(|_| cast_error())?),
        ColumnKind::Boolean => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" => RawValue::Boolean(true),
            "false" | "f" | "0" | "no" => RawValue::Boolean(false),
            _ => return Err(cast_error()),
        },
        ColumnKind::Text => RawValue::Text(text.to_string()),
        ColumnKind::Date => RawValue::Date(
            NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|_| cast_error())?,
        ),
        ColumnKind::Time => RawValue::Time(
            NaiveTime::parse_from_str(text.trim(), "%H:%M:%S%.f").map_err(|_| cast_error())?,
        ),
        ColumnKind::Timestamp => {
            let trimmed = text.trim();
            let parsed = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f"))
                .map_err(|_| cast_error())?;
            RawValue::Timestamp(parsed)
        }
    };
    Ok(value)
}
