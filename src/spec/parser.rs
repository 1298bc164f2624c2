use serde::{Deserialize, Serialize};

/// One fixture file as written. Every section is optional; the compiler
/// concatenates sections across files.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSpecFile {
    pub version: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub identifiers: Vec<IdentifierDef>,
    #[serde(default)]
    pub sources: Vec<RawSourceDef>,
    #[serde(default)]
    pub targets: Vec<RawTargetDef>,
    #[serde(default)]
    pub factories: Vec<RawFactory>,
    #[serde(default)]
    pub scenarios: Vec<RawScenario>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierDef {
    pub identifier: String,
    pub attributes: Vec<AttributeDef>,
}

impl IdentifierDef {
    pub fn attribute(&self, field: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.field == field)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub field: String,
    pub generator: Generator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generator {
    UniqueInteger,
    UniqueString,
    Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierMapEntry {
    pub column: String,
    pub identifier: IdentifierAttrRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierAttrRef {
    pub name: String,
    pub attribute: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSourceDef {
    pub source: String,
    #[serde(default)]
    pub identifier_map: Vec<IdentifierMapEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTargetDef {
    pub target: String,
    #[serde(default)]
    pub identifier_map: Vec<IdentifierMapEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFactory {
    pub factory: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub data: Vec<RawFactoryData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFactoryRef {
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub data: Vec<RawFactoryData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFactoryData {
    pub source: String,
    pub table: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawScenario {
    pub scenario: String,
    pub description: Option<String>,
    pub factory: Option<RawFactoryRef>,
    #[serde(default)]
    pub cases: Vec<RawCase>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCase {
    pub case: String,
    pub description: Option<String>,
    pub factory: Option<RawFactoryRef>,
    pub expected: Option<RawExpected>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawExpected {
    #[serde(default)]
    pub data: Vec<RawExpectedData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawExpectedData {
    pub target: String,
    pub table: String,
    #[serde(default)]
    pub by: Vec<String>,
}
