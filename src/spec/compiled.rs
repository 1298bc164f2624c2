use super::parser::{IdentifierDef, IdentifierMapEntry};
use super::table::FixtureTable;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledSpec {
    pub version: Option<String>,
    pub description: Option<String>,
    pub identifiers: Vec<IdentifierDef>,
    pub sources: Vec<TableDef>,
    pub targets: Vec<TableDef>,
    pub scenarios: Vec<CompiledScenario>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default)]
    pub identifier_map: Vec<IdentifierMapEntry>,
}

impl TableDef {
    pub fn mapping(&self, column: &str) -> Option<&IdentifierMapEntry> {
        self.identifier_map.iter().find(|m| m.column == column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledScenario {
    pub name: String,
    pub description: Option<String>,
    pub cases: Vec<CompiledCase>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledCase {
    pub name: String,
    pub description: Option<String>,
    /// Source name to the rows the case seeds.
    pub data: BTreeMap<String, FixtureTable>,
    pub expected: Vec<Expectation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expectation {
    pub target: String,
    #[serde(default)]
    pub by: Vec<String>,
    pub table: FixtureTable,
}

impl CompiledSpec {
    pub fn source(&self, name: &str) -> Option<&TableDef> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn target(&self, name: &str) -> Option<&TableDef> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn identifier(&self, name: &str) -> Option<&IdentifierDef> {
        self.identifiers.iter().find(|i| i.identifier == name)
    }

    /// Every case with its scenario, in declaration order.
    pub fn cases(&self) -> impl Iterator<Item = (&CompiledScenario, &CompiledCase)> {
        self.scenarios
            .iter()
            .flat_map(|scenario| scenario.cases.iter().map(move |case| (scenario, case)))
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn write_yaml(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }
}
