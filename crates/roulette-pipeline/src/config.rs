//! Engine configuration

use crate::preview::PreviewConfig;
use crate::strength::DEFAULT_BOUND;
use roulette_lora::{CacheConfig, LoaderConfig, DEFAULT_EXTENSIONS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration load errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Strength parsing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrengthConfig {
    /// Absolute bound for range ends
    pub bound: f64,
}

impl Default for StrengthConfig {
    fn default() -> Self {
        Self {
            bound: DEFAULT_BOUND,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Candidate file extensions
    pub extensions: Vec<String>,
    /// Metadata cache settings
    pub cache: CacheConfig,
    /// Strength parsing settings
    pub strength: StrengthConfig,
    /// Files between metadata search progress lines
    pub progress_interval: usize,
    /// Preview settings
    pub preview: PreviewConfig,
    /// Largest LoRA file the loader accepts, in bytes
    pub max_file_size: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            cache: CacheConfig::default(),
            strength: StrengthConfig::default(),
            progress_interval: 100,
            preview: PreviewConfig::default(),
            max_file_size: LoaderConfig::default().max_file_size,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Configuration for one-off command line runs
    pub fn headless() -> Self {
        Self {
            preview: PreviewConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Configuration for very large libraries
    pub fn large_library() -> Self {
        Self {
            cache: CacheConfig {
                max_entries: 65536,
                ..Default::default()
            },
            progress_interval: 500,
            ..Default::default()
        }
    }

    /// Loader settings derived from this configuration
    pub fn loader(&self) -> LoaderConfig {
        LoaderConfig {
            max_file_size: self.max_file_size,
        }
    }
}
