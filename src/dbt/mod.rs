use crate::error::{HarnessError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

/// The transformation step between seeding sources and reading targets.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn run(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct DbtRunner {
    executable: PathBuf,
    project_dir: PathBuf,
    profiles_dir: Option<PathBuf>,
    profile: Option<String>,
    target: Option<String>,
}

impl DbtRunner {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: PathBuf::from("dbt"),
            project_dir: project_dir.into(),
            profiles_dir: None,
            profile: None,
            target: None,
        }
    }

    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn with_profiles_dir(mut self, profiles_dir: impl Into<PathBuf>) -> Self {
        self.profiles_dir = Some(profiles_dir.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--project-dir".to_string(),
            self.project_dir.display().to_string(),
        ];
        if let Some(dir) = &self.profiles_dir {
            args.push("--profiles-dir".to_string());
            args.push(dir.display().to_string());
        }
        if let Some(profile) = &self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        if let Some(target) = &self.target {
            args.push("--target".to_string());
            args.push(target.clone());
        }
        args
    }
}

/// Logs every line read from `reader`. Bytes that are not UTF-8 are replaced.
async fn forward_lines<R: AsyncRead + Unpin>(reader: R, stderr: bool) -> std::io::Result<usize> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut count = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        if stderr {
            warn!(target: "dbt", "{}", line);
        } else {
            info!(target: "dbt", "{}", line);
        }
        count += 1;
    }
    Ok(count)
}

#[async_trait]
impl Transformer for DbtRunner {
    async fn run(&self) -> Result<()> {
        let args = self.args();
        info!(
            executable = %self.executable.display(),
            args = %args.join(" "),
            "Running dbt"
        );

        let mut child = Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::DbtRun("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| HarnessError::DbtRun("stderr not captured".to_string()))?;

        let (out, err) = tokio::join!(forward_lines(stdout, false), forward_lines(stderr, true));

        // the exit status decides the outcome, forwarding errors come second
        let status = child.wait().await?;
        if !status.success() {
            return Err(HarnessError::DbtRun(status.to_string()));
        }
        out?;
        err?;
        info!("dbt run finished");
        Ok(())
    }
}
