use super::compiled::{CompiledSpec, Expectation, TableDef};
use super::identifier::{CaseIndex, IdentifierRegistry};
use super::report::{AssertionReport, ExpectationFailure};
use super::table::FixtureTable;
use crate::error::{HarnessError, Result};
use crate::normalize::{Actuals, NULL_TOKEN};
use crate::warehouse::InsertBatch;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

const MISSING_COLUMN: &str = "{MISSING COLUMN}";

/// Seeds sources from a compiled spec and checks loaded actuals against its
/// expectations.
pub struct SpecApi {
    spec: CompiledSpec,
    registry: IdentifierRegistry,
    sources: Vec<(String, InsertBatch)>,
    actuals: HashMap<String, Actuals>,
}

impl SpecApi {
    pub fn new(spec: CompiledSpec) -> Self {
        let registry = IdentifierRegistry::new(&spec.identifiers);
        Self {
            spec,
            registry,
            sources: Vec::new(),
            actuals: HashMap::new(),
        }
    }

    pub fn spec(&self) -> &CompiledSpec {
        &self.spec
    }

    pub fn source_names(&self) -> Vec<String> {
        self.spec.sources.iter().map(|s| s.name.clone()).collect()
    }

    pub fn target_names(&self) -> Vec<String> {
        self.spec.targets.iter().map(|t| t.name.clone()).collect()
    }

    /// Translates every case's fixture rows into one batch per declared
    /// source. Identifier references get fresh values for each case.
    pub fn generate_sources(&mut self) -> Result<&[(String, InsertBatch)]> {
        self.registry = IdentifierRegistry::new(&self.spec.identifiers);

        let mut batches: Vec<(String, InsertBatch)> = self
            .spec
            .sources
            .iter()
            .map(|s| (s.name.clone(), InsertBatch::default()))
            .collect();

        let cases: Vec<_> = self.spec.cases().map(|(_, case)| case.clone()).collect();
        for (case_index, case) in cases.iter().enumerate() {
            for (source_name, table) in &case.data {
                let source = self.spec.source(source_name).cloned().ok_or_else(|| {
                    HarnessError::Validation(format!("undeclared source '{}'", source_name))
                })?;
                let (_, batch) = batches
                    .iter_mut()
                    .find(|(name, _)| name == source_name)
                    .ok_or_else(|| {
                        HarnessError::Validation(format!("undeclared source '{}'", source_name))
                    })?;
                append_rows(&mut self.registry, case_index, &source, table, batch)?;
            }
        }

        for (name, batch) in &batches {
            debug!(source = %name, rows = batch.len(), "Generated source data");
        }
        self.sources = batches;
        Ok(&self.sources)
    }

    pub fn source_data(&self, name: &str) -> Option<&InsertBatch> {
        self.sources
            .iter()
            .find(|(source, _)| source == name)
            .map(|(_, batch)| batch)
    }

    pub fn load_actuals(&mut self, actuals: HashMap<String, Actuals>) {
        self.actuals.extend(actuals);
    }

    pub fn assert_expectations(&self) -> Result<AssertionReport> {
        let mut report = AssertionReport::default();

        for (case_index, (scenario, case)) in self.spec.cases().enumerate() {
            for expectation in &case.expected {
                let target = self.spec.target(&expectation.target).ok_or_else(|| {
                    HarnessError::Validation(format!(
                        "undeclared target '{}'",
                        expectation.target
                    ))
                })?;
                let actuals = self
                    .actuals
                    .get(&expectation.target)
                    .ok_or_else(|| HarnessError::MissingActuals(expectation.target.clone()))?;

                let actual = self.case_actuals(case_index, target, expectation, actuals);
                report.checked += 1;
                if tables_match(expectation, &actual) {
                    debug!(
                        scenario = %scenario.name,
                        case = %case.name,
                        table = %expectation.target,
                        "Expectation met"
                    );
                } else {
                    warn!(
                        scenario = %scenario.name,
                        case = %case.name,
                        table = %expectation.target,
                        "Expectation failed"
                    );
                    report.failures.push(ExpectationFailure::new(
                        &scenario.name,
                        &case.name,
                        &expectation.target,
                        sorted(&expectation.table, &expectation.by),
                        sorted(&actual, &expectation.by),
                    ));
                }
            }
        }

        info!(
            checked = report.checked,
            failed = report.failures.len(),
            "Asserted expectations"
        );
        Ok(report)
    }

    /// Actual rows of `target` that belong to the case, projected onto the
    /// expected columns, with identifier values translated back to references.
    fn case_actuals(
        &self,
        case_index: CaseIndex,
        target: &TableDef,
        expectation: &Expectation,
        actuals: &Actuals,
    ) -> FixtureTable {
        let columns = expectation.table.columns.clone();
        let mut rows = Vec::new();

        for record in &actuals.records {
            let Some(translated) = self.translate_record(case_index, target, record) else {
                continue;
            };
            rows.push(
                columns
                    .iter()
                    .map(|column| {
                        translated
                            .get(column)
                            .cloned()
                            .unwrap_or_else(|| MISSING_COLUMN.to_string())
                    })
                    .collect(),
            );
        }

        FixtureTable { columns, rows }
    }

    fn translate_record(
        &self,
        case_index: CaseIndex,
        target: &TableDef,
        record: &BTreeMap<String, String>,
    ) -> Option<BTreeMap<String, String>> {
        if target.identifier_map.is_empty() {
            return Some(record.clone());
        }

        let mut translated = record.clone();
        let mut owned = false;
        for mapping in &target.identifier_map {
            let Some(value) = record.get(&mapping.column) else {
                continue;
            };
            if value == NULL_TOKEN {
                continue;
            }
            let owner = self.registry.lookup(
                &mapping.identifier.name,
                &mapping.identifier.attribute,
                value,
            );
            match owner {
                Some(named) if named.case == case_index => {
                    translated.insert(mapping.column.clone(), named.reference.clone());
                    owned = true;
                }
                Some(_) => return None,
                None => {
                    debug!(
                        table = %target.name,
                        column = %mapping.column,
                        value = %value,
                        "Actual value matches no generated identifier"
                    );
                    return None;
                }
            }
        }
        owned.then_some(translated)
    }
}

fn append_rows(
    registry: &mut IdentifierRegistry,
    case_index: CaseIndex,
    source: &TableDef,
    table: &FixtureTable,
    batch: &mut InsertBatch,
) -> Result<()> {
    let mut positions = Vec::with_capacity(table.columns.len());
    for column in &table.columns {
        let idx = match batch.columns.iter().position(|c| c == column) {
            Some(idx) => idx,
            None => {
                batch.columns.push(column.clone());
                for row in batch.rows.iter_mut() {
                    row.push(None);
                }
                batch.columns.len() - 1
            }
        };
        positions.push(idx);
    }

    for row in &table.rows {
        let mut values: Vec<Option<String>> = vec![None; batch.columns.len()];
        for ((column, cell), &idx) in table.columns.iter().zip(row).zip(&positions) {
            if cell == NULL_TOKEN {
                continue;
            }
            values[idx] = Some(match source.mapping(column) {
                Some(mapping) => registry.value(
                    case_index,
                    &mapping.identifier.name,
                    &mapping.identifier.attribute,
                    cell,
                )?,
                None => cell.clone(),
            });
        }
        batch.rows.push(values);
    }
    Ok(())
}

fn tables_match(expectation: &Expectation, actual: &FixtureTable) -> bool {
    let expected = sorted(&expectation.table, &expectation.by);
    let actual = sorted(actual, &expectation.by);
    expected.rows == actual.rows
}

/// Rows ordered by the `by` columns, ties broken by the whole row.
fn sorted(table: &FixtureTable, by: &[String]) -> FixtureTable {
    let keys: Vec<usize> = by.iter().filter_map(|c| table.column_index(c)).collect();
    let mut rows = table.rows.clone();
    rows.sort_by(|a, b| {
        let key_a: Vec<&String> = keys.iter().map(|&i| &a[i]).collect();
        let key_b: Vec<&String> = keys.iter().map(|&i| &b[i]).collect();
        key_a.cmp(&key_b).then_with(|| a.cmp(b))
    });
    FixtureTable {
        columns: table.columns.clone(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SpecCompiler;

    const SPEC: &str = r#"
identifiers:
  - identifier: students
    attributes:
      - field: id
        generator: unique_integer
sources:
  - source: raw.students
    identifier_map:
      - column: id
        identifier: { name: students, attribute: id }
  - source: raw.empty
targets:
  - target: dim.students
    identifier_map:
      - column: id
        identifier: { name: students, attribute: id }
scenarios:
  - scenario: Students
    cases:
      - case: first
        factory:
          data:
            - source: raw.students
              table: |
                | id | name   | age    |
                | -  | -      | -      |
                | s1 | Buffy  | 16     |
                | s2 | Willow | {NULL} |
        expected:
          data:
            - target: dim.students
              by: [id]
              table: |
                | id | name   |
                | -  | -      |
                | s2 | Willow |
                | s1 | Buffy  |
      - case: second
        factory:
          data:
            - source: raw.students
              table: |
                | id | name |
                | -  | -    |
                | s1 | Xander |
        expected:
          data:
            - target: dim.students
              by: [id]
              table: |
                | id | name   |
                | -  | -      |
                | s1 | Xander |
"#;

    fn create_test_api() -> SpecApi {
        SpecApi::new(SpecCompiler::new().compile_str(SPEC).unwrap())
    }

    /// Echoes the seeded rows back as a target would after a pass-through model.
    fn echo_actuals(api: &SpecApi, rewrite: impl Fn(&str, &str) -> String) -> Actuals {
        let batch = api.source_data("raw.students").unwrap();
        let records = batch
            .rows
            .iter()
            .map(|row| {
                batch
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(column, cell)| {
                        let value = cell.clone().unwrap_or_else(|| NULL_TOKEN.to_string());
                        (column.clone(), rewrite(column, &value))
                    })
                    .collect()
            })
            .collect();
        Actuals {
            records,
            columns: batch.columns.clone(),
        }
    }

    #[test]
    fn test_generate_sources_translates_references() {
        let mut api = create_test_api();
        let batches = api.generate_sources().unwrap();
        assert_eq!(batches.len(), 2);

        let students = api.source_data("raw.students").unwrap();
        assert_eq!(students.columns, vec!["id", "name", "age"]);
        assert_eq!(students.rows.len(), 3);
        assert_eq!(students.rows[0][0].as_deref(), Some("1"));
        assert_eq!(students.rows[1][2], None);
        // second case row has no age column
        assert_eq!(students.rows[2][0].as_deref(), Some("3"));
        assert_eq!(students.rows[2][2], None);

        assert!(api.source_data("raw.empty").unwrap().is_empty());
    }

    #[test]
    fn test_pass_through_actuals_meet_expectations() {
        let mut api = create_test_api();
        api.generate_sources().unwrap();
        // ids read back from a NUMBER column carry four decimal places
        let actuals = echo_actuals(&api, |column, value| {
            if column == "id" {
                format!("{}.0000", value)
            } else {
                value.to_string()
            }
        });
        api.load_actuals(HashMap::from([("dim.students".to_string(), actuals)]));

        let report = api.assert_expectations().unwrap();
        assert_eq!(report.checked, 2);
        assert!(report.passed(), "{:?}", report.failures);
    }

    #[test]
    fn test_mismatch_is_reported_per_case() {
        let mut api = create_test_api();
        api.generate_sources().unwrap();
        let actuals = echo_actuals(&api, |column, value| {
            if column == "name" && value == "Xander" {
                "Spike".to_string()
            } else {
                value.to_string()
            }
        });
        api.load_actuals(HashMap::from([("dim.students".to_string(), actuals)]));

        let report = api.assert_expectations().unwrap();
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.case, "second");
        assert!(failure.diff.contains("Spike"));
        assert!(failure.diff.contains("Xander"));
    }

    #[test]
    fn test_foreign_rows_are_dropped() {
        let mut api = create_test_api();
        api.generate_sources().unwrap();
        let mut actuals = echo_actuals(&api, |_, value| value.to_string());
        actuals.records.push(BTreeMap::from([
            ("id".to_string(), "999".to_string()),
            ("name".to_string(), "Stranger".to_string()),
        ]));
        api.load_actuals(HashMap::from([("dim.students".to_string(), actuals)]));
        assert!(api.assert_expectations().unwrap().passed());
    }

    #[test]
    fn test_missing_actuals_is_error() {
        let mut api = create_test_api();
        api.generate_sources().unwrap();
        let err = api.assert_expectations().unwrap_err();
        assert!(matches!(err, HarnessError::MissingActuals(t) if t == "dim.students"));
    }

    #[test]
    fn test_missing_column_fails_expectation() {
        let mut api = create_test_api();
        api.generate_sources().unwrap();
        let mut actuals = echo_actuals(&api, |_, value| value.to_string());
        for record in actuals.records.iter_mut() {
            record.remove("name");
        }
        api.load_actuals(HashMap::from([("dim.students".to_string(), actuals)]));
        let report = api.assert_expectations().unwrap();
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures[0].diff.contains(MISSING_COLUMN));
    }

    #[test]
    fn test_sorted_by_key_columns() {
        let table = FixtureTable {
            columns: vec!["id".to_string(), "v".to_string()],
            rows: vec![
                vec!["b".to_string(), "1".to_string()],
                vec!["a".to_string(), "2".to_string()],
            ],
        };
        let result = sorted(&table, &["id".to_string()]);
        assert_eq!(result.rows[0][0], "a");
    }
}
