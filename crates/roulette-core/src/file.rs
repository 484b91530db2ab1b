//! Candidate LoRA files

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A discovered LoRA file, identified by its path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoraFile {
    path: PathBuf,
}

impl LoraFile {
    /// Wrap a path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Full path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without extension, used in notation and filtering
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name including extension
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Containing directory
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Lower-case extension, empty if none
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    /// Sibling path `<dir>/<name><suffix>`
    pub fn sibling(&self, suffix: &str) -> PathBuf {
        self.dir().join(format!("{}{}", self.name(), suffix))
    }
}

impl From<PathBuf> for LoraFile {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}
