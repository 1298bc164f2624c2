mod memory;
mod snapshot;
mod snowflake;
pub(crate) mod sql_builder;
mod table_ref;

pub use memory::MemoryWarehouse;
pub use snapshot::{Column, ColumnKind, InsertBatch, RawValue, TableSnapshot};
pub use snowflake::{SnowflakeConnection, SnowflakeWarehouse};
pub use table_ref::TableRef;

use crate::error::Result;
use async_trait::async_trait;

/// Something the harness can open connections against.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Schema used for table identifiers without a schema segment.
    fn default_schema(&self) -> &str;

    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// An open session. Callers must `close` it once done, also on failure.
#[async_trait]
pub trait Connection: Send {
    /// `TRUNCATE TABLE IF EXISTS` on the identifier as written.
    async fn truncate_table(&mut self, table: &str) -> Result<()>;

    async fn insert_rows(&mut self, table: &TableRef, batch: &InsertBatch) -> Result<u64>;

    async fn read_table(&mut self, table: &TableRef) -> Result<TableSnapshot>;

    async fn commit(&mut self) -> Result<()>;

    async fn close(self: Box<Self>) -> Result<()>;
}
