use super::parser::{Generator, IdentifierDef};
use crate::error::{HarnessError, Result};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

/// Position of a case in `CompiledSpec::cases()` order.
pub type CaseIndex = usize;

/// Owner of a generated identifier value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRef {
    pub case: CaseIndex,
    pub reference: String,
}

/// Generated identifier values per case, with the reverse index used to
/// translate warehouse values back to the names fixtures use.
#[derive(Debug, Default)]
pub struct IdentifierRegistry {
    definitions: HashMap<String, IdentifierDef>,
    counters: HashMap<(String, String), u64>,
    generated: HashMap<(CaseIndex, String, String), BTreeMap<String, String>>,
    reverse: HashMap<(String, String, String), NamedRef>,
}

impl IdentifierRegistry {
    pub fn new(definitions: &[IdentifierDef]) -> Self {
        Self {
            definitions: definitions
                .iter()
                .map(|d| (d.identifier.clone(), d.clone()))
                .collect(),
            ..Self::default()
        }
    }

    /// Value of `identifier.attribute` for `reference` within `case`,
    /// generating the whole identifier record on first use.
    pub fn value(
        &mut self,
        case: CaseIndex,
        identifier: &str,
        attribute: &str,
        reference: &str,
    ) -> Result<String> {
        let key = (case, identifier.to_string(), reference.to_string());
        if !self.generated.contains_key(&key) {
            let record = self.generate(case, identifier, reference)?;
            self.generated.insert(key.clone(), record);
        }
        self.generated
            .get(&key)
            .and_then(|record| record.get(attribute))
            .cloned()
            .ok_or_else(|| {
                HarnessError::Validation(format!(
                    "identifier '{}' has no attribute '{}'",
                    identifier, attribute
                ))
            })
    }

    /// Case and reference that produced `value`, if any did.
    pub fn lookup(&self, identifier: &str, attribute: &str, value: &str) -> Option<&NamedRef> {
        self.reverse.get(&(
            identifier.to_string(),
            attribute.to_string(),
            value_key(value),
        ))
    }

    fn generate(
        &mut self,
        case: CaseIndex,
        identifier: &str,
        reference: &str,
    ) -> Result<BTreeMap<String, String>> {
        let definition = self.definitions.get(identifier).cloned().ok_or_else(|| {
            HarnessError::Validation(format!("unknown identifier '{}'", identifier))
        })?;

        let mut record = BTreeMap::new();
        for attribute in &definition.attributes {
            let counter = self
                .counters
                .entry((identifier.to_string(), attribute.field.clone()))
                .or_insert(0);
            *counter += 1;
            let value = match attribute.generator {
                Generator::UniqueInteger => counter.to_string(),
                Generator::UniqueString => format!("{}-{}", identifier, counter),
                Generator::Uuid => uuid::Uuid::new_v4().to_string(),
            };
            self.reverse.insert(
                (
                    identifier.to_string(),
                    attribute.field.clone(),
                    value_key(&value),
                ),
                NamedRef {
                    case,
                    reference: reference.to_string(),
                },
            );
            record.insert(attribute.field.clone(), value);
        }
        Ok(record)
    }
}

/// Numbers compare by value so `1.0000` read back from a numeric column
/// matches a generated `1`.
fn value_key(value: &str) -> String {
    match Decimal::from_str(value.trim()) {
        Ok(number) => number.normalize().to_string(),
        Err(_) => value.to_string(),
    }
}
