use crate::error::{HarnessError, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

static TEMPLATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\{\{\s*(?:dbt_source\(\s*['"]([^'"]+)['"]\s*,\s*['"]([^'"]+)['"]\s*\)|dbt_ref\(\s*['"]([^'"]+)['"]\s*\))\s*\}\}"#,
    )
    .expect("template pattern regex is valid")
});

const RELATION_RESOURCE_TYPES: [&str; 3] = ["model", "seed", "snapshot"];

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    nodes: HashMap<String, RawNode>,
    #[serde(default)]
    sources: HashMap<String, RawSource>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    resource_type: String,
    name: String,
    database: Option<String>,
    schema: Option<String>,
    alias: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    source_name: String,
    name: String,
    database: Option<String>,
    schema: Option<String>,
    identifier: Option<String>,
}

/// Relation names of the models and sources of a compiled dbt project.
#[derive(Debug, Clone, Default)]
pub struct DbtManifest {
    refs: HashMap<String, String>,
    sources: HashMap<(String, String), String>,
}

impl DbtManifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::SpecParse(format!("cannot read manifest {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let raw: RawManifest = serde_json::from_str(content)?;

        let refs: HashMap<String, String> = raw
            .nodes
            .into_values()
            .filter(|node| RELATION_RESOURCE_TYPES.contains(&node.resource_type.as_str()))
            .map(|node| {
                let table = node.alias.unwrap_or_else(|| node.name.clone());
                let relation = relation_name(node.database, node.schema, table);
                (node.name, relation)
            })
            .collect();

        let sources: HashMap<(String, String), String> = raw
            .sources
            .into_values()
            .map(|source| {
                let table = source.identifier.unwrap_or_else(|| source.name.clone());
                let relation = relation_name(source.database, source.schema, table);
                ((source.source_name, source.name), relation)
            })
            .collect();

        debug!(
            refs = refs.len(),
            sources = sources.len(),
            "Compiled dbt manifest"
        );
        Ok(Self { refs, sources })
    }

    pub fn resolve_ref(&self, model: &str) -> Option<&str> {
        self.refs.get(model).map(String::as_str)
    }

    pub fn resolve_source(&self, source: &str, table: &str) -> Option<&str> {
        self.sources
            .get(&(source.to_string(), table.to_string()))
            .map(String::as_str)
    }
}

fn relation_name(database: Option<String>, schema: Option<String>, table: String) -> String {
    [database, schema, Some(table)]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Expands `{{ dbt_source('a', 'b') }}` and `{{ dbt_ref('m') }}` in table names.
pub struct TemplateRenderer<'a> {
    manifest: Option<&'a DbtManifest>,
}

impl<'a> TemplateRenderer<'a> {
    pub fn new(manifest: Option<&'a DbtManifest>) -> Self {
        Self { manifest }
    }

    pub fn render(&self, text: &str) -> Result<String> {
        if !TEMPLATE_PATTERN.is_match(text) {
            return Ok(text.trim().to_string());
        }
        let manifest = self.manifest.ok_or_else(|| {
            HarnessError::Template(format!("'{}' needs a dbt manifest to render", text))
        })?;

        let mut failure = None;
        let rendered = TEMPLATE_PATTERN.replace_all(text, |caps: &Captures| {
            let resolved = match (caps.get(1), caps.get(2), caps.get(3)) {
                (Some(source), Some(table), _) => manifest
                    .resolve_source(source.as_str(), table.as_str())
                    .ok_or_else(|| {
                        format!("unknown source '{}.{}'", source.as_str(), table.as_str())
                    }),
                (_, _, Some(model)) => manifest
                    .resolve_ref(model.as_str())
                    .ok_or_else(|| format!("unknown model '{}'", model.as_str())),
                _ => Err(format!("unrecognised template '{}'", &caps[0])),
            };
            match resolved {
                Ok(relation) => relation.to_string(),
                Err(message) => {
                    failure.get_or_insert(message);
                    String::new()
                }
            }
        });

        match failure {
            Some(message) => Err(HarnessError::Template(message)),
            None => Ok(rendered.trim().to_string()),
        }
    }
}
