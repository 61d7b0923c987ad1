//! Job configuration and workspace layout.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Input artifacts of one acquisition.
///
/// Only `bold` is required. Unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobConfig {
    pub bold: PathBuf,
    #[serde(default)]
    pub events: Option<PathBuf>,
    #[serde(default)]
    pub sbref: Option<PathBuf>,
    #[serde(default)]
    pub physio: Option<PathBuf>,
    #[serde(default)]
    pub physio_json: Option<PathBuf>,
}

impl JobConfig {
    /// Build a configuration with only the BOLD input set.
    pub fn new<P: Into<PathBuf>>(bold: P) -> Self {
        Self {
            bold: bold.into(),
            events: None,
            sbref: None,
            physio: None,
            physio_json: None,
        }
    }

    /// Parse a configuration document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::Configuration(format!("invalid job configuration: {}", e)))
    }

    /// Read and parse a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }
}

/// Working directory of a run. Relative config paths resolve against `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub root: PathBuf,
}

impl Workspace {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a configured path; absolute paths are kept as given.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    /// Directory holding the staged links.
    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    /// Directory holding the preview images.
    pub fn preview_dir(&self) -> PathBuf {
        self.root.join("secondary")
    }

    /// Location of the validation report.
    pub fn product_path(&self) -> PathBuf {
        self.root.join("product.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let job = JobConfig::from_json_str(r#"{"bold": "in/bold.nii.gz"}"#).unwrap();
        assert_eq!(job, JobConfig::new("in/bold.nii.gz"));
    }

    #[test]
    fn test_full_config_ignores_unknown_keys() {
        let job = JobConfig::from_json_str(
            r#"{
                "bold": "/data/bold.nii.gz",
                "events": "events.tsv",
                "sbref": "sbref.nii.gz",
                "physio": "physio.tsv.gz",
                "physio_json": "physio.json",
                "_inputs": [{"id": "bold"}]
            }"#,
        )
        .unwrap();
        assert_eq!(job.events.as_deref(), Some(Path::new("events.tsv")));
        assert_eq!(job.physio_json.as_deref(), Some(Path::new("physio.json")));
    }

    #[test]
    fn test_missing_bold_rejected() {
        let err = JobConfig::from_json_str(r#"{"events": "events.tsv"}"#).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("bold"));
    }

    #[test]
    fn test_missing_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = JobConfig::from_file(dir.path().join("config.json")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_workspace_layout() {
        let ws = Workspace::new("/job");
        assert_eq!(ws.output_dir(), Path::new("/job/output"));
        assert_eq!(ws.preview_dir(), Path::new("/job/secondary"));
        assert_eq!(ws.product_path(), Path::new("/job/product.json"));
        assert_eq!(ws.resolve(Path::new("a/b")), Path::new("/job/a/b"));
        assert_eq!(ws.resolve(Path::new("/abs/b")), Path::new("/abs/b"));
    }
}
