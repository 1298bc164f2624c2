use crate::dbt::DbtRunner;
use crate::error::{HarnessError, Result};
use crate::profile::default_profiles_dir;
use crate::spec::{CompiledSpec, DbtManifest, SpecCompiler};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Everything a harness run reads from the outside world.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub project_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub profile: String,
    pub target: Option<String>,
    pub specs_dir: PathBuf,
    pub manifest: PathBuf,
    pub compiled_output: PathBuf,
    pub scenario: Option<String>,
    pub case: Option<String>,
    pub dbt_bin: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            profiles_dir: default_profiles_dir(),
            profile: "dbt_shop".to_string(),
            target: None,
            specs_dir: PathBuf::from("tests/specs"),
            manifest: PathBuf::from("target/manifest.json"),
            compiled_output: PathBuf::from("tests/compiled_specs.yml"),
            scenario: None,
            case: None,
            dbt_bin: PathBuf::from("dbt"),
        }
    }
}

impl HarnessConfig {
    /// Relative spec, manifest and output paths resolve against the project.
    fn project_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    pub fn specs_path(&self) -> PathBuf {
        self.project_path(&self.specs_dir)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.project_path(&self.manifest)
    }

    pub fn compiled_output_path(&self) -> PathBuf {
        self.project_path(&self.compiled_output)
    }

    pub fn load_manifest(&self) -> Result<Option<DbtManifest>> {
        let path = self.manifest_path();
        if !path.exists() {
            debug!(path = %path.display(), "No dbt manifest, templates stay unresolved");
            return Ok(None);
        }
        DbtManifest::load(&path).map(Some)
    }

    /// Compiles the fixture specs and writes the result to `compiled_output`.
    pub fn compile_specs(&self) -> Result<CompiledSpec> {
        let manifest = self.load_manifest()?;
        let mut compiler = SpecCompiler::new();
        if let Some(manifest) = &manifest {
            compiler = compiler.with_manifest(manifest);
        }
        if let Some(pattern) = &self.scenario {
            compiler = compiler.with_scenario_selector(selector(pattern)?);
        }
        if let Some(pattern) = &self.case {
            compiler = compiler.with_case_selector(selector(pattern)?);
        }

        let spec = compiler.compile_dir(self.specs_path())?;
        let output = self.compiled_output_path();
        spec.write_yaml(&output)?;
        info!(
            path = %output.display(),
            scenarios = spec.scenarios.len(),
            "Wrote compiled specs"
        );
        Ok(spec)
    }

    pub fn dbt_runner(&self) -> DbtRunner {
        let mut runner = DbtRunner::new(&self.project_dir)
            .with_executable(&self.dbt_bin)
            .with_profiles_dir(&self.profiles_dir)
            .with_profile(&self.profile);
        if let Some(target) = &self.target {
            runner = runner.with_target(target);
        }
        runner
    }
}

fn selector(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| HarnessError::Validation(format!("invalid selector '{}': {}", pattern, e)))
}
