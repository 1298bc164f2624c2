mod api;
mod compiled;
mod compiler;
mod files;
mod identifier;
mod manifest;
mod parser;
mod report;
mod table;

pub use api::SpecApi;
pub use compiled::{CompiledCase, CompiledScenario, CompiledSpec, Expectation, TableDef};
pub use compiler::SpecCompiler;
pub use files::{FileLoader, SpecFile};
pub use identifier::{CaseIndex, IdentifierRegistry, NamedRef};
pub use manifest::{DbtManifest, TemplateRenderer};
pub use parser::{
    AttributeDef, Generator, IdentifierAttrRef, IdentifierDef, IdentifierMapEntry, RawSpecFile,
};
pub use report::{colorize_diff, render_table, table_diff, AssertionReport, ExpectationFailure};
pub use table::FixtureTable;
