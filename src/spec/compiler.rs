use super::compiled::{CompiledCase, CompiledScenario, CompiledSpec, Expectation, TableDef};
use super::files::FileLoader;
use super::manifest::{DbtManifest, TemplateRenderer};
use super::parser::{
    IdentifierDef, IdentifierMapEntry, RawFactory, RawFactoryData, RawFactoryRef, RawSpecFile,
};
use super::table::FixtureTable;
use crate::error::{HarnessError, Result};
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

type CaseData = BTreeMap<String, FixtureTable>;

#[derive(Default)]
pub struct SpecCompiler<'a> {
    manifest: Option<&'a DbtManifest>,
    scenario_selector: Option<Regex>,
    case_selector: Option<Regex>,
}

impl<'a> SpecCompiler<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_manifest(mut self, manifest: &'a DbtManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    pub fn with_scenario_selector(mut self, selector: Regex) -> Self {
        self.scenario_selector = Some(selector);
        self
    }

    pub fn with_case_selector(mut self, selector: Regex) -> Self {
        self.case_selector = Some(selector);
        self
    }

    pub fn compile_dir(&self, path: impl AsRef<Path>) -> Result<CompiledSpec> {
        let files = FileLoader::load_dir(&path)?;
        info!(
            path = %path.as_ref().display(),
            files = files.len(),
            "Compiling fixture specs"
        );
        let raw = files
            .into_iter()
            .map(|file| {
                serde_yaml::from_str::<RawSpecFile>(&file.content).map_err(|e| {
                    HarnessError::SpecParse(format!("{}: {}", file.path.display(), e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.compile_files(raw)
    }

    pub fn compile_str(&self, yaml: &str) -> Result<CompiledSpec> {
        self.compile_files(vec![serde_yaml::from_str(yaml)?])
    }

    pub fn compile_files(&self, files: Vec<RawSpecFile>) -> Result<CompiledSpec> {
        let merged = merge_files(files);
        let renderer = TemplateRenderer::new(self.manifest);

        let identifiers = merged.identifiers.clone();
        ensure_unique(identifiers.iter().map(|i| i.identifier.as_str()), "identifier")?;

        let sources = merged
            .sources
            .iter()
            .map(|s| render_table_def(&renderer, &s.source, &s.identifier_map))
            .collect::<Result<Vec<_>>>()?;
        let targets = merged
            .targets
            .iter()
            .map(|t| render_table_def(&renderer, &t.target, &t.identifier_map))
            .collect::<Result<Vec<_>>>()?;
        ensure_unique(sources.iter().map(|s| s.name.as_str()), "source")?;
        ensure_unique(targets.iter().map(|t| t.name.as_str()), "target")?;
        for def in sources.iter().chain(&targets) {
            validate_identifier_map(def, &identifiers)?;
        }

        ensure_unique(merged.factories.iter().map(|f| f.factory.as_str()), "factory")?;
        let factories: HashMap<&str, &RawFactory> = merged
            .factories
            .iter()
            .map(|f| (f.factory.as_str(), f))
            .collect();
        let resolver = FactoryResolver {
            factories,
            renderer: &renderer,
        };

        ensure_unique(merged.scenarios.iter().map(|s| s.scenario.as_str()), "scenario")?;
        let mut scenarios = Vec::new();
        for raw_scenario in &merged.scenarios {
            if !selected(&self.scenario_selector, &raw_scenario.scenario) {
                debug!(scenario = %raw_scenario.scenario, "Scenario not selected");
                continue;
            }
            ensure_unique(
                raw_scenario.cases.iter().map(|c| c.case.as_str()),
                &format!("case in scenario '{}'", raw_scenario.scenario),
            )?;

            let scenario_data = match &raw_scenario.factory {
                Some(factory) => resolver.resolve_ref(factory)?,
                None => CaseData::new(),
            };

            let mut cases = Vec::new();
            for raw_case in &raw_scenario.cases {
                if !selected(&self.case_selector, &raw_case.case) {
                    continue;
                }
                let mut data = scenario_data.clone();
                if let Some(factory) = &raw_case.factory {
                    data.extend(resolver.resolve_ref(factory)?);
                }
                for source in data.keys() {
                    if !sources.iter().any(|s| &s.name == source) {
                        return Err(HarnessError::Validation(format!(
                            "case '{}' seeds undeclared source '{}'",
                            raw_case.case, source
                        )));
                    }
                }

                let expected = raw_case
                    .expected
                    .as_ref()
                    .map(|e| e.data.as_slice())
                    .unwrap_or_default()
                    .iter()
                    .map(|raw| {
                        let target = renderer.render(&raw.target)?;
                        if !targets.iter().any(|t| t.name == target) {
                            return Err(HarnessError::Validation(format!(
                                "case '{}' expects undeclared target '{}'",
                                raw_case.case, target
                            )));
                        }
                        let table = FixtureTable::parse(&raw.table)?;
                        for column in &raw.by {
                            if table.column_index(column).is_none() {
                                return Err(HarnessError::Validation(format!(
                                    "case '{}': 'by' column '{}' is not in the expected table",
                                    raw_case.case, column
                                )));
                            }
                        }
                        Ok(Expectation {
                            target,
                            by: raw.by.clone(),
                            table,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                cases.push(CompiledCase {
                    name: raw_case.case.clone(),
                    description: raw_case.description.clone(),
                    data,
                    expected,
                });
            }

            scenarios.push(CompiledScenario {
                name: raw_scenario.scenario.clone(),
                description: raw_scenario.description.clone(),
                cases,
            });
        }

        Ok(CompiledSpec {
            version: merged.version,
            description: merged.description,
            identifiers,
            sources,
            targets,
            scenarios,
        })
    }
}

fn merge_files(files: Vec<RawSpecFile>) -> RawSpecFile {
    let mut merged = RawSpecFile::default();
    for file in files {
        merged.version = merged.version.or(file.version);
        merged.description = merged.description.or(file.description);
        merged.identifiers.extend(file.identifiers);
        merged.sources.extend(file.sources);
        merged.targets.extend(file.targets);
        merged.factories.extend(file.factories);
        merged.scenarios.extend(file.scenarios);
    }
    merged
}

fn selected(selector: &Option<Regex>, name: &str) -> bool {
    selector.as_ref().map_or(true, |re| re.is_match(name))
}

fn ensure_unique<'s>(names: impl Iterator<Item = &'s str>, kind: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(HarnessError::Validation(format!(
                "duplicate {} '{}'",
                kind, name
            )));
        }
    }
    Ok(())
}

fn render_table_def(
    renderer: &TemplateRenderer<'_>,
    name: &str,
    identifier_map: &[IdentifierMapEntry],
) -> Result<TableDef> {
    Ok(TableDef {
        name: renderer.render(name)?,
        identifier_map: identifier_map.to_vec(),
    })
}

fn validate_identifier_map(def: &TableDef, identifiers: &[IdentifierDef]) -> Result<()> {
    for entry in &def.identifier_map {
        let identifier = identifiers
            .iter()
            .find(|i| i.identifier == entry.identifier.name)
            .ok_or_else(|| {
                HarnessError::Validation(format!(
                    "'{}' maps column '{}' to unknown identifier '{}'",
                    def.name, entry.column, entry.identifier.name
                ))
            })?;
        if identifier.attribute(&entry.identifier.attribute).is_none() {
            return Err(HarnessError::Validation(format!(
                "'{}' maps column '{}' to unknown attribute '{}.{}'",
                def.name, entry.column, entry.identifier.name, entry.identifier.attribute
            )));
        }
    }
    Ok(())
}

struct FactoryResolver<'f> {
    factories: HashMap<&'f str, &'f RawFactory>,
    renderer: &'f TemplateRenderer<'f>,
}

impl FactoryResolver<'_> {
    fn resolve_ref(&self, factory: &RawFactoryRef) -> Result<CaseData> {
        let mut stack = Vec::new();
        let mut data = CaseData::new();
        for parent in &factory.parents {
            data.extend(self.resolve_named(parent, &mut stack)?);
        }
        data.extend(self.parse_data(&factory.data)?);
        Ok(data)
    }

    fn resolve_named(&self, name: &str, stack: &mut Vec<String>) -> Result<CaseData> {
        if stack.iter().any(|n| n == name) {
            return Err(HarnessError::Validation(format!(
                "factory cycle: {} -> {}",
                stack.join(" -> "),
                name
            )));
        }
        let factory = self.factories.get(name).ok_or_else(|| {
            HarnessError::Validation(format!("unknown factory '{}'", name))
        })?;

        stack.push(name.to_string());
        let mut data = CaseData::new();
        for parent in &factory.parents {
            data.extend(self.resolve_named(parent, stack)?);
        }
        data.extend(self.parse_data(&factory.data)?);
        stack.pop();
        Ok(data)
    }

    fn parse_data(&self, data: &[RawFactoryData]) -> Result<CaseData> {
        data.iter()
            .map(|d| {
                let source = self.renderer.render(&d.source)?;
                Ok((source, FixtureTable::parse(&d.table)?))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"
version: "0.1"
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
  - source: raw.schools
targets:
  - target: dim.students
    identifier_map:
      - column: id
        identifier: { name: students, attribute: id }
factories:
  - factory: Schools
    data:
      - source: raw.schools
        table: |
          | school |
          | -      |
          | Sunnydale |
  - factory: SomeStudents
    parents: [Schools]
    data:
      - source: raw.students
        table: |
          | id | name  |
          | -  | -     |
          | s1 | Buffy |
scenarios:
  - scenario: Students
    factory:
      parents: [SomeStudents]
    cases:
      - case: inherited
        expected:
          data:
            - target: dim.students
              by: [id]
              table: |
                | id | name  |
                | s1 | Buffy |
      - case: overridden
        factory:
          data:
            - source: raw.students
              table: |
                | id | name   |
                | s2 | Willow |
  - scenario: Other
    cases:
      - case: empty
"#;

    #[test]
    fn test_factories_layer_in_order() {
        let spec = SpecCompiler::new().compile_str(SPEC).unwrap();
        assert_eq!(spec.scenarios.len(), 2);

        let inherited = &spec.scenarios[0].cases[0];
        assert_eq!(inherited.data["raw.students"].rows[0][1], "Buffy");
        assert_eq!(inherited.data["raw.schools"].rows[0][0], "Sunnydale");
        assert_eq!(inherited.expected[0].by, vec!["id"]);

        let overridden = &spec.scenarios[0].cases[1];
        assert_eq!(overridden.data["raw.students"].rows[0][1], "Willow");
        assert!(overridden.data.contains_key("raw.schools"));
        assert!(overridden.expected.is_empty());
    }

    #[test]
    fn test_selectors() {
        let spec = SpecCompiler::new()
            .with_scenario_selector(Regex::new("^Stud").unwrap())
            .with_case_selector(Regex::new("over").unwrap())
            .compile_str(SPEC)
            .unwrap();
        assert_eq!(spec.scenarios.len(), 1);
        assert_eq!(spec.scenarios[0].cases.len(), 1);
        assert_eq!(spec.scenarios[0].cases[0].name, "overridden");
    }

    #[test]
    fn test_compiled_spec_writes_yaml() {
        let spec = SpecCompiler::new().compile_str(SPEC).unwrap();
        let yaml = spec.to_yaml().unwrap();
        assert!(yaml.contains("raw.students"));
        let back: CompiledSpec = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn test_unknown_factory_parent() {
        let yaml = r#"
scenarios:
  - scenario: S
    factory:
      parents: [Missing]
    cases:
      - case: c
"#;
        let err = SpecCompiler::new().compile_str(yaml).unwrap_err();
        assert!(err.to_string().contains("Missing"));
    }

    #[test]
    fn test_factory_cycle() {
        let yaml = r#"
factories:
  - factory: A
    parents: [B]
  - factory: B
    parents: [A]
scenarios:
  - scenario: S
    factory:
      parents: [A]
    cases:
      - case: c
"#;
        let err = SpecCompiler::new().compile_str(yaml).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_undeclared_source_and_target() {
        let yaml = r#"
scenarios:
  - scenario: S
    cases:
      - case: c
        factory:
          data:
            - source: raw.ghost
              table: |
                | a |
"#;
        assert!(SpecCompiler::new().compile_str(yaml).is_err());

        let yaml = r#"
scenarios:
  - scenario: S
    cases:
      - case: c
        expected:
          data:
            - target: dim.ghost
              table: |
                | a |
"#;
        assert!(SpecCompiler::new().compile_str(yaml).is_err());
    }

    #[test]
    fn test_duplicate_names() {
        let yaml = r#"
sources:
  - source: raw.a
  - source: raw.a
"#;
        let err = SpecCompiler::new().compile_str(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate source"));
    }

    #[test]
    fn test_unknown_identifier_attribute() {
        let yaml = r#"
identifiers:
  - identifier: students
    attributes:
      - field: id
        generator: unique_integer
sources:
  - source: raw.a
    identifier_map:
      - column: id
        identifier: { name: students, attribute: uuid }
"#;
        let err = SpecCompiler::new().compile_str(yaml).unwrap_err();
        assert!(err.to_string().contains("students.uuid"));
    }

    #[test]
    fn test_templated_names_use_manifest() {
        let manifest = DbtManifest::from_json(
            r#"{"nodes": {"model.p.dim": {"resource_type": "model", "name": "dim", "database": "DB", "schema": "ANALYTICS"}},
                "sources": {"source.p.raw.a": {"source_name": "raw", "name": "a", "database": "DB", "schema": "RAW"}}}"#,
        )
        .unwrap();
        let yaml = r#"
sources:
  - source: "{{ dbt_source('raw', 'a') }}"
targets:
  - target: "{{ dbt_ref('dim') }}"
scenarios:
  - scenario: S
    cases:
      - case: c
        factory:
          data:
            - source: "{{ dbt_source('raw', 'a') }}"
              table: |
                | x |
                | 1 |
        expected:
          data:
            - target: "{{ dbt_ref('dim') }}"
              table: |
                | x |
                | 1 |
"#;
        let spec = SpecCompiler::new()
            .with_manifest(&manifest)
            .compile_str(yaml)
            .unwrap();
        assert_eq!(spec.sources[0].name, "DB.RAW.a");
        assert_eq!(spec.targets[0].name, "DB.ANALYTICS.dim");
        assert!(spec.scenarios[0].cases[0].data.contains_key("DB.RAW.a"));
        assert_eq!(spec.scenarios[0].cases[0].expected[0].target, "DB.ANALYTICS.dim");
    }
}
