//! LoRA file discovery and deduplication

use roulette_core::{LoraFile, Outcome, Warning};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Extensions treated as LoRA files by default
pub const DEFAULT_EXTENSIONS: &[&str] = &["safetensors", "pt", "ckpt"];

/// Finds candidate LoRA files under a folder
#[derive(Debug, Clone)]
pub struct LoraCatalog {
    /// Lower-case extensions without the dot
    extensions: Vec<String>,
}

impl LoraCatalog {
    /// Create a catalog with the given extensions
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Configured extensions
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Whether a path has a candidate extension
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|e| self.extensions.contains(&e))
    }

    /// Every candidate file under `folder`, in traversal order
    ///
    /// A missing folder yields an empty list and a warning.
    pub fn discover(&self, folder: &Path, include_subfolders: bool) -> Outcome<Vec<LoraFile>> {
        if !folder.is_dir() {
            return Outcome::warned(Vec::new(), Warning::FolderNotFound(folder.to_path_buf()));
        }

        let walker = if include_subfolders {
            WalkDir::new(folder)
        } else {
            WalkDir::new(folder).max_depth(1)
        };

        let files: Vec<LoraFile> = walker
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && self.accepts(entry.path()))
            .map(|entry| LoraFile::new(entry.into_path()))
            .collect();

        debug!(folder = %folder.display(), count = files.len(), "Discovered LoRA files");
        Outcome::clean(files)
    }
}

impl Default for LoraCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS)
    }
}

/// Keep the first file for each name, dropping later repeats
///
/// Names compare with their extension, so `a.safetensors` and `a.pt` both stay.
pub fn dedupe(files: Vec<LoraFile>) -> Outcome<Vec<LoraFile>> {
    let mut outcome = Outcome::<Vec<LoraFile>>::clean(Vec::with_capacity(files.len()));
    let mut kept: HashMap<String, usize> = HashMap::new();

    for file in files {
        let name = file.file_name();
        match kept.get(&name) {
            Some(&index) => {
                let warning = Warning::DuplicateSkipped {
                    name,
                    kept: outcome.value[index].path().to_path_buf(),
                    skipped: file.path().to_path_buf(),
                };
                outcome.warn(warning);
            }
            None => {
                kept.insert(name, outcome.value.len());
                outcome.value.push(file);
            }
        }
    }

    outcome
}
