use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Profile error: {0}")]
    Profile(String),

    #[error("Spec parse error: {0}")]
    SpecParse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Type error in column '{column}' at row {row}: {message}")]
    Type {
        column: String,
        row: usize,
        message: String,
    },

    #[error("Warehouse error: {0}")]
    Warehouse(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("dbt failed to run successfully ({0}), please see log for details")]
    DbtRun(String),

    #[error("No actuals loaded for target: {0}")]
    MissingActuals(String),

    #[error("{0} expectation(s) failed")]
    ExpectationsFailed(usize),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
