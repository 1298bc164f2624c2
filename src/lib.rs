pub mod dbt;
pub mod error;
pub mod harness;
pub mod normalize;
pub mod profile;
pub mod spec;
pub mod warehouse;

pub use dbt::{DbtRunner, Transformer};
pub use error::{HarnessError, Result};
pub use harness::{Harness, HarnessConfig};
pub use normalize::{normalize, Actuals, CanonicalTable, NULL_TOKEN};
pub use profile::{default_profiles_dir, ConnectionParams, ProfileLoader};
pub use spec::{
    AssertionReport, CompiledCase, CompiledScenario, CompiledSpec, DbtManifest,
    ExpectationFailure, FixtureTable, SpecApi, SpecCompiler,
};
pub use warehouse::{
    Column, ColumnKind, Connection, InsertBatch, MemoryWarehouse, RawValue, SnowflakeWarehouse,
    TableRef, TableSnapshot, Warehouse,
};
