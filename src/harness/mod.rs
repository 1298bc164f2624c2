mod config;
mod runner;

pub use config::HarnessConfig;
pub use runner::{release, Harness};
