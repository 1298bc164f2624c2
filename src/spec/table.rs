use crate::error::{HarnessError, Result};
use serde::{Deserialize, Serialize};

/// A fixture table written as a markdown table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl FixtureTable {
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty());

        let header = lines
            .next()
            .ok_or_else(|| HarnessError::SpecParse("fixture table has no header".to_string()))?;
        let columns = split_row(header);
        if columns.iter().any(String::is_empty) {
            return Err(HarnessError::SpecParse(format!(
                "fixture table header has an empty column: '{}'",
                header
            )));
        }

        let mut rows = Vec::new();
        for line in lines {
            let cells = split_row(line);
            if is_separator(&cells) {
                continue;
            }
            if cells.len() != columns.len() {
                return Err(HarnessError::SpecParse(format!(
                    "fixture row '{}' has {} cells, header has {}",
                    line,
                    cells.len(),
                    columns.len()
                )));
            }
            rows.push(cells);
        }

        Ok(Self { columns, rows })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn split_row(line: &str) -> Vec<String> {
    let inner = line.strip_prefix('|').unwrap_or(line);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(|cell| cell.trim().to_string()).collect()
}

fn is_separator(cells: &[String]) -> bool {
    cells
        .iter()
        .all(|cell| !cell.is_empty() && cell.chars().all(|c| c == '-' || c == ':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_separator() {
        let table = FixtureTable::parse(
            r#"
            | id | name   |
            | -  | -      |
            | s1 | Buffy  |
            | s2 | {NULL} |
            "#,
        )
        .unwrap();
        assert_eq!(table.columns, vec!["id", "name"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1], vec!["s2", "{NULL}"]);
    }

    #[test]
    fn test_parse_without_separator_or_outer_pipes() {
        let table = FixtureTable::parse("id | amt\n1 | 3\n").unwrap();
        assert_eq!(table.columns, vec!["id", "amt"]);
        assert_eq!(table.rows, vec![vec!["1".to_string(), "3".to_string()]]);
    }

    #[test]
    fn test_header_only_table_is_empty() {
        let table = FixtureTable::parse("| id |\n| --- |").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_ragged_row_is_error() {
        let err = FixtureTable::parse("| a | b |\n| 1 |").unwrap_err();
        assert!(matches!(err, HarnessError::SpecParse(_)));
    }

    #[test]
    fn test_missing_header_is_error() {
        assert!(FixtureTable::parse("   \n  ").is_err());
    }
}
