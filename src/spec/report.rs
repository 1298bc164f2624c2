use super::table::FixtureTable;
use crate::error::{HarnessError, Result};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::fmt;
use tabled::builder::Builder;
use tabled::settings::Style;

#[derive(Debug, Clone)]
pub struct ExpectationFailure {
    pub scenario: String,
    pub case: String,
    pub target: String,
    pub expected: FixtureTable,
    pub actual: FixtureTable,
    pub diff: String,
}

impl ExpectationFailure {
    pub fn new(
        scenario: &str,
        case: &str,
        target: &str,
        expected: FixtureTable,
        actual: FixtureTable,
    ) -> Self {
        let diff = table_diff(&expected, &actual);
        Self {
            scenario: scenario.to_string(),
            case: case.to_string(),
            target: target.to_string(),
            expected,
            actual,
            diff,
        }
    }
}

impl fmt::Display for ExpectationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} / {}: {} does not match ({} expected rows, {} actual rows)",
            self.scenario,
            self.case,
            self.target,
            self.expected.rows.len(),
            self.actual.rows.len()
        )?;
        write!(f, "{}", self.diff)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssertionReport {
    pub checked: usize,
    pub failures: Vec<ExpectationFailure>,
}

impl AssertionReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            Ok(self)
        } else {
            Err(HarnessError::ExpectationsFailed(self.failures.len()))
        }
    }
}

pub fn render_table(table: &FixtureTable) -> String {
    let mut builder = Builder::default();
    builder.push_record(table.columns.iter().cloned());
    for row in &table.rows {
        builder.push_record(row.iter().cloned());
    }
    let mut rendered = builder.build();
    rendered.with(Style::markdown());
    rendered.to_string()
}

/// Line diff of the rendered tables, `-` for expected only, `+` for actual only.
pub fn table_diff(expected: &FixtureTable, actual: &FixtureTable) -> String {
    let expected = render_table(expected);
    let actual = render_table(actual);
    let diff = TextDiff::from_lines(&expected, &actual);

    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        out.push_str(sign);
        out.push_str(change.value().trim_end_matches('\n'));
        out.push('\n');
    }
    out
}

pub fn colorize_diff(diff: &str) -> String {
    diff.lines()
        .map(|line| {
            if line.starts_with('-') {
                line.red().to_string()
            } else if line.starts_with('+') {
                line.green().to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
