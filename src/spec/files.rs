use crate::error::{HarnessError, Result};
use std::path::{Path, PathBuf};

const SPEC_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

#[derive(Debug, Clone)]
pub struct SpecFile {
    pub path: PathBuf,
    pub content: String,
}

pub struct FileLoader;

impl FileLoader {
    /// Every fixture file below `path`, in path order.
    pub fn load_dir(path: impl AsRef<Path>) -> Result<Vec<SpecFile>> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(HarnessError::SpecParse(format!(
                "spec directory {} does not exist",
                path.display()
            )));
        }

        let mut paths = Vec::new();
        for extension in SPEC_EXTENSIONS {
            let pattern = format!("{}/**/*.{}", path.display(), extension);
            let matches = glob::glob(&pattern)
                .map_err(|e| HarnessError::SpecParse(e.to_string()))?
                .filter_map(|entry| entry.ok());
            paths.extend(matches);
        }
        paths.sort();

        paths.into_iter().map(Self::load_file).collect()
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<SpecFile> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Ok(SpecFile {
            path: path.to_path_buf(),
            content,
        })
    }
}
