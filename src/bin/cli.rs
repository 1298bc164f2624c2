use clap::{Parser, Subcommand};
use colored::Colorize;
use dbtspec::harness::release;
use dbtspec::normalize::normalize;
use dbtspec::spec::{colorize_diff, render_table, FixtureTable, SpecApi};
use dbtspec::warehouse::{SnowflakeWarehouse, TableRef, Warehouse};
use dbtspec::{Harness, HarnessConfig, HarnessError, ProfileLoader, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dbtspec")]
#[command(about = "Fixture-driven tests for dbt projects on Snowflake")]
#[command(version)]
struct Cli {
    #[arg(long, env = "DBTSPEC_PROJECT_DIR", default_value = ".")]
    project_dir: PathBuf,

    /// Directory holding profiles.yml [default: ~/.dbt]
    #[arg(long, env = "DBT_PROFILES_DIR")]
    profiles_dir: Option<PathBuf>,

    #[arg(long, env = "DBTSPEC_PROFILE", default_value = "dbt_shop")]
    profile: String,

    #[arg(long, env = "DBTSPEC_TARGET")]
    target: Option<String>,

    #[arg(long, env = "DBTSPEC_SPECS_DIR", default_value = "tests/specs")]
    specs_dir: PathBuf,

    #[arg(long, env = "DBTSPEC_MANIFEST", default_value = "target/manifest.json")]
    manifest: PathBuf,

    #[arg(
        long,
        env = "DBTSPEC_COMPILED_OUTPUT",
        default_value = "tests/compiled_specs.yml"
    )]
    compiled_output: PathBuf,

    /// Only run scenarios whose name matches this regex
    #[arg(long, env = "DBTSPEC_SCENARIO")]
    scenario: Option<String>,

    /// Only run cases whose name matches this regex
    #[arg(long, env = "DBTSPEC_CASE")]
    case: Option<String>,

    #[arg(long, env = "DBTSPEC_DBT_BIN", default_value = "dbt")]
    dbt_bin: PathBuf,

    #[arg(short, long, env = "DBTSPEC_VERBOSE")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed fixtures, run dbt and check the expected tables
    Test,
    /// Compile the spec files and write the compiled output
    Compile,
    /// Print a warehouse table the way expectations see it
    Inspect {
        /// Table identifier, e.g. analytics.orders
        table: String,
    },
}

impl Cli {
    fn harness_config(&self) -> HarnessConfig {
        let defaults = HarnessConfig::default();
        HarnessConfig {
            project_dir: self.project_dir.clone(),
            profiles_dir: self
                .profiles_dir
                .clone()
                .unwrap_or(defaults.profiles_dir),
            profile: self.profile.clone(),
            target: self.target.clone(),
            specs_dir: self.specs_dir.clone(),
            manifest: self.manifest.clone(),
            compiled_output: self.compiled_output.clone(),
            scenario: self.scenario.clone(),
            case: self.case.clone(),
            dbt_bin: self.dbt_bin.clone(),
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose || std::env::var_os("DEBUG").is_some() {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},reqwest=error,hyper=error,hyper_util=error,rustls=error",
            default_level
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn connect_warehouse(config: &HarnessConfig) -> Result<SnowflakeWarehouse> {
    let params = ProfileLoader::load(
        &config.profiles_dir,
        &config.profile,
        config.target.as_deref(),
    )?;
    info!(url = %params.redacted_url(), "Using warehouse connection");
    SnowflakeWarehouse::new(params)
}

async fn run_tests(config: &HarnessConfig) -> Result<()> {
    let spec = config.compile_specs()?;
    let warehouse = connect_warehouse(config)?;
    let dbt = config.dbt_runner();
    let harness = Harness::new(&warehouse, &dbt);

    let mut api = SpecApi::new(spec);
    let report = harness.run(&mut api).await?;

    for failure in &report.failures {
        println!(
            "{} {} / {}: {}",
            "FAIL".red().bold(),
            failure.scenario,
            failure.case,
            failure.target
        );
        println!("{}", colorize_diff(&failure.diff));
    }

    if report.passed() {
        println!(
            "{} {} expectation(s) met",
            "PASS".green().bold(),
            report.checked
        );
    } else {
        println!(
            "{} of {} expectation(s) failed",
            report.failures.len(),
            report.checked
        );
    }
    report.into_result().map(|_| ())
}

async fn inspect(config: &HarnessConfig, table: &str) -> Result<()> {
    let warehouse = connect_warehouse(config)?;
    let table = TableRef::resolve(table, warehouse.default_schema());

    let mut conn = warehouse.connect().await?;
    let result = conn.read_table(&table).await;
    let snapshot = release(conn, result).await?;

    let canonical = normalize(&snapshot)?;
    let rows = (0..canonical.row_count)
        .map(|row| {
            canonical
                .columns
                .iter()
                .map(|column| {
                    canonical
                        .column(column)
                        .and_then(|cells| cells.get(row))
                        .cloned()
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect();
    let fixture = FixtureTable {
        columns: canonical.columns.clone(),
        rows,
    };

    println!("{}", table.to_string().bold());
    println!("{}", render_table(&fixture));
    println!("{} row(s)", canonical.row_count);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = cli.harness_config();

    let result = match &cli.command {
        Commands::Test => run_tests(&config).await,
        Commands::Compile => config.compile_specs().map(|spec| {
            println!(
                "Compiled {} scenario(s) to {}",
                spec.scenarios.len(),
                config.compiled_output_path().display()
            );
        }),
        Commands::Inspect { table } => inspect(&config, table).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(HarnessError::ExpectationsFailed(count)) => {
            error!(failed = count, "Expectations not met");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "dbtspec failed");
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
