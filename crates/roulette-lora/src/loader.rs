//! Raw LoRA tensor loading

use crate::block_weight::TensorMap;
use candle_core::Device;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Loader errors
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("File too large: {size} > {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("Unsupported file type: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

/// Loader configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Maximum file size in bytes
    pub max_file_size: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_file_size: 2 * 1024 * 1024 * 1024, // 2GB
        }
    }
}

/// Reads LoRA files into CPU tensors
#[derive(Debug, Clone, Default)]
pub struct LoraLoader {
    config: LoaderConfig,
}

impl LoraLoader {
    /// Create a new loader
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Get configuration
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load every tensor of a LoRA file
    ///
    /// `.safetensors` files are memory-mapped; `.pt` and `.ckpt` files are
    /// read as pickled state dicts.
    pub fn load_raw(&self, path: impl AsRef<Path>) -> Result<TensorMap, LoaderError> {
        let path = path.as_ref();

        if !path.is_file() {
            return Err(LoaderError::NotFound(path.to_path_buf()));
        }

        let size = std::fs::metadata(path)?.len();
        if size > self.config.max_file_size {
            return Err(LoaderError::TooLarge {
                size,
                limit: self.config.max_file_size,
            });
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let tensors: TensorMap = match extension.as_str() {
            "safetensors" => candle_core::safetensors::load(path, &Device::Cpu)?,
            "pt" | "ckpt" => candle_core::pickle::read_all(path)?.into_iter().collect(),
            other => return Err(LoaderError::Unsupported(other.to_string())),
        };

        debug!(path = %path.display(), tensors = tensors.len(), "Loaded LoRA tensors");
        Ok(tensors)
    }
}
