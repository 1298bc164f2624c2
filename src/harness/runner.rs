use crate::dbt::Transformer;
use crate::error::Result;
use crate::normalize::{normalize, Actuals};
use crate::spec::{AssertionReport, SpecApi};
use crate::warehouse::{Connection, InsertBatch, TableRef, Warehouse};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Drives one fixture run: clean, seed, transform, read back, assert.
pub struct Harness<'a> {
    warehouse: &'a dyn Warehouse,
    transformer: &'a dyn Transformer,
}

impl<'a> Harness<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, transformer: &'a dyn Transformer) -> Self {
        Self {
            warehouse,
            transformer,
        }
    }

    pub async fn run(&self, api: &mut SpecApi) -> Result<AssertionReport> {
        let sources = api.source_names();
        let targets = api.target_names();

        self.clean_test_data(&sources, &targets).await?;

        let batches = api.generate_sources()?;
        self.load_sources(batches).await?;

        info!("Running transformation");
        self.transformer.run().await?;

        let actuals = self.load_actuals(&targets).await?;
        api.load_actuals(actuals);
        api.assert_expectations()
    }

    pub async fn clean_test_data(&self, sources: &[String], targets: &[String]) -> Result<()> {
        let mut tables: Vec<&str> = Vec::new();
        for name in sources.iter().chain(targets) {
            if !tables.contains(&name.as_str()) {
                tables.push(name.as_str());
            }
        }

        let mut conn = self.warehouse.connect().await?;
        let result = truncate_all(conn.as_mut(), &tables).await;
        release(conn, result).await?;
        info!(tables = tables.len(), "Cleaned test data");
        Ok(())
    }

    pub async fn load_sources(&self, batches: &[(String, InsertBatch)]) -> Result<()> {
        let mut conn = self.warehouse.connect().await?;
        let result = self.insert_all(conn.as_mut(), batches).await;
        release(conn, result).await
    }

    pub async fn load_actuals(&self, targets: &[String]) -> Result<HashMap<String, Actuals>> {
        let mut conn = self.warehouse.connect().await?;
        let result = self.read_all(conn.as_mut(), targets).await;
        release(conn, result).await
    }

    async fn insert_all(
        &self,
        conn: &mut dyn Connection,
        batches: &[(String, InsertBatch)],
    ) -> Result<()> {
        for (name, batch) in batches {
            if batch.is_empty() {
                debug!(table = %name, "No fixture rows, skipping insert");
                continue;
            }
            let table = TableRef::resolve(name, self.warehouse.default_schema());
            let rows = conn.insert_rows(&table, batch).await?;
            info!(table = %table, rows, "Loaded source data");
        }
        conn.commit().await
    }

    async fn read_all(
        &self,
        conn: &mut dyn Connection,
        targets: &[String],
    ) -> Result<HashMap<String, Actuals>> {
        let mut actuals = HashMap::with_capacity(targets.len());
        for name in targets {
            let table = TableRef::resolve(name, self.warehouse.default_schema());
            let snapshot = conn.read_table(&table).await?;
            let canonical = normalize(&snapshot)?;
            debug!(table = %table, rows = canonical.row_count, "Loaded actuals");
            actuals.insert(name.clone(), canonical.into_actuals());
        }
        Ok(actuals)
    }
}

async fn truncate_all(conn: &mut dyn Connection, tables: &[&str]) -> Result<()> {
    for table in tables {
        conn.truncate_table(table).await?;
    }
    conn.commit().await
}

/// Closes `conn` whatever the step returned. The step's own error wins.
pub async fn release<T>(conn: Box<dyn Connection>, result: Result<T>) -> Result<T> {
    let closed = conn.close().await;
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_error)) => {
            warn!(error = %close_error, "Failed to close connection after error");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarnessError;
    use crate::spec::SpecCompiler;
    use crate::warehouse::{Column, ColumnKind, MemoryWarehouse, TableSnapshot};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SPEC: &str = r#"
sources:
  - source: raw.orders
  - source: raw.customers
targets:
  - target: analytics.orders
scenarios:
  - scenario: Orders
    cases:
      - case: one order
        factory:
          data:
            - source: raw.orders
              table: |
                | id | total |
                | -  | -     |
                | o1 | 12.5  |
        expected:
          data:
            - target: analytics.orders
              table: |
                | id | total   |
                | -  | -       |
                | o1 | 12.5000 |
"#;

    struct FailingTransformer;

    #[async_trait]
    impl Transformer for FailingTransformer {
        async fn run(&self) -> Result<()> {
            Err(HarnessError::DbtRun("exit status: 1".to_string()))
        }
    }

    /// Copies raw.orders into analytics.orders.
    struct CopyTransformer {
        warehouse: MemoryWarehouse,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Transformer for CopyTransformer {
        async fn run(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let rows = self
                .warehouse
                .snapshot(&TableRef::new("raw", "orders"))?
                .map(|s| s.rows)
                .unwrap_or_default();
            self.warehouse
                .replace_rows(&TableRef::new("analytics", "orders"), rows)
        }
    }

    /// A connection whose close always fails.
    struct BrokenCloseConnection;

    #[async_trait]
    impl Connection for BrokenCloseConnection {
        async fn truncate_table(&mut self, _table: &str) -> Result<()> {
            Ok(())
        }

        async fn insert_rows(&mut self, _table: &TableRef, batch: &InsertBatch) -> Result<u64> {
            Ok(batch.rows.len() as u64)
        }

        async fn read_table(&mut self, table: &TableRef) -> Result<TableSnapshot> {
            Err(HarnessError::TableNotFound(table.to_string()))
        }

        async fn commit(&mut self) -> Result<()> {
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Err(HarnessError::Warehouse("session already closed".to_string()))
        }
    }

    fn create_test_warehouse() -> MemoryWarehouse {
        let warehouse = MemoryWarehouse::new("public");
        let columns = vec![
            Column::new("id", ColumnKind::Text),
            Column::new("total", ColumnKind::Decimal { scale: 2 }),
        ];
        warehouse
            .create_table(TableRef::new("raw", "orders"), columns.clone())
            .unwrap();
        warehouse
            .create_table(TableRef::new("analytics", "orders"), columns)
            .unwrap();
        warehouse
    }

    fn create_test_api() -> SpecApi {
        SpecApi::new(SpecCompiler::new().compile_str(SPEC).unwrap())
    }

    #[tokio::test]
    async fn test_run_passes_with_copy_transformer() {
        let warehouse = create_test_warehouse();
        let transformer = CopyTransformer {
            warehouse: warehouse.clone(),
            runs: AtomicUsize::new(0),
        };
        let harness = Harness::new(&warehouse, &transformer);
        let mut api = create_test_api();

        let report = harness.run(&mut api).await.unwrap();
        assert!(report.passed(), "{:?}", report.failures);
        assert_eq!(report.checked, 1);
        assert_eq!(transformer.runs.load(Ordering::SeqCst), 1);
        assert_eq!(warehouse.open_connections().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_source_is_not_inserted() {
        let warehouse = create_test_warehouse();
        let transformer = CopyTransformer {
            warehouse: warehouse.clone(),
            runs: AtomicUsize::new(0),
        };
        let harness = Harness::new(&warehouse, &transformer);
        let mut api = create_test_api();
        harness.run(&mut api).await.unwrap();

        // raw.customers has no rows and no table; only raw.orders is inserted
        assert_eq!(warehouse.insert_calls().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clean_truncates_each_table_once() {
        let warehouse = create_test_warehouse();
        let harness = Harness::new(&warehouse, &FailingTransformer);
        harness
            .clean_test_data(
                &["raw.orders".to_string(), "raw.orders".to_string()],
                &["analytics.orders".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(
            warehouse.truncated().unwrap(),
            vec!["raw.orders", "analytics.orders"]
        );
    }

    #[tokio::test]
    async fn test_failed_transform_aborts_before_actuals() {
        let warehouse = create_test_warehouse();
        let harness = Harness::new(&warehouse, &FailingTransformer);
        let mut api = create_test_api();

        let err = harness.run(&mut api).await.unwrap_err();
        assert!(matches!(err, HarnessError::DbtRun(_)));
        assert!(matches!(
            api.assert_expectations(),
            Err(HarnessError::MissingActuals(_))
        ));
        assert_eq!(warehouse.open_connections().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_connection_closed_when_step_fails() {
        let warehouse = MemoryWarehouse::new("public");
        let harness = Harness::new(&warehouse, &FailingTransformer);

        let err = harness
            .load_actuals(&["analytics.missing".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::TableNotFound(_)));
        assert_eq!(warehouse.open_connections().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_release_keeps_read_error_over_close_error() {
        let mut conn: Box<dyn Connection> = Box::new(BrokenCloseConnection);
        let result = conn.read_table(&TableRef::new("analytics", "orders")).await;

        let err = release(conn, result).await.unwrap_err();
        assert!(matches!(err, HarnessError::TableNotFound(_)));
        assert!(err.to_string().contains("analytics.orders"));
    }

    #[tokio::test]
    async fn test_release_reports_close_error_after_success() {
        let conn: Box<dyn Connection> = Box::new(BrokenCloseConnection);

        let err = release(conn, Ok(3)).await.unwrap_err();
        assert!(matches!(err, HarnessError::Warehouse(_)));
    }
}
