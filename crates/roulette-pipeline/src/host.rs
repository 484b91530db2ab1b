//! Host collaborator seam
//!
//! The engine never touches model weights itself. Loading a LoRA, merging it
//! into the model/text-encoder pair and encoding prompts are delegated to a
//! [`ModelHost`]. Handles are opaque to the engine and are only replaced
//! when a merge succeeds.

use roulette_core::LoraFile;
use roulette_lora::{LoaderConfig, LoaderError, LoraLoader, TensorMap};
use thiserror::Error;
use tracing::debug;

/// Host errors
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Load failed: {0}")]
    Load(#[from] LoaderError),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("Merge failed: {0}")]
    Merge(String),

    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Model environment the engine merges LoRAs into
pub trait ModelHost {
    /// Diffusion model handle
    type Model: Clone;
    /// Text encoder handle
    type Clip: Clone;
    /// Encoded prompt
    type Conditioning;

    /// Read every tensor of a LoRA file
    fn load_raw(&self, file: &LoraFile) -> Result<TensorMap, HostError>;

    /// Merge tensors into new model and encoder handles
    fn merge(
        &self,
        model: &Self::Model,
        clip: &Self::Clip,
        tensors: &TensorMap,
        model_strength: f64,
        clip_strength: f64,
    ) -> Result<(Self::Model, Self::Clip), HostError>;

    /// Encode prompt text
    fn encode(&self, clip: &Self::Clip, text: &str) -> Result<Self::Conditioning, HostError>;
}

/// One merge seen by [`DryRunHost`]
#[derive(Debug, Clone, PartialEq)]
pub struct MergeRecord {
    /// Number of tensors merged
    pub tensors: usize,
    /// Model strength passed to the merge
    pub model_strength: f64,
    /// Encoder strength passed to the merge
    pub clip_strength: f64,
}

/// Handle of [`DryRunHost`]: the merges applied so far
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeLog {
    /// Applied merges, oldest first
    pub merges: Vec<MergeRecord>,
}

impl MergeLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of merges applied
    pub fn len(&self) -> usize {
        self.merges.len()
    }

    /// Check if nothing was merged
    pub fn is_empty(&self) -> bool {
        self.merges.is_empty()
    }
}

/// Host that loads real tensors but only records merges
///
/// Encoding returns the text it was given.
#[derive(Debug, Clone, Default)]
pub struct DryRunHost {
    loader: LoraLoader,
}

impl DryRunHost {
    /// Create a dry-run host
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            loader: LoraLoader::new(config),
        }
    }
}

impl ModelHost for DryRunHost {
    type Model = MergeLog;
    type Clip = MergeLog;
    type Conditioning = String;

    fn load_raw(&self, file: &LoraFile) -> Result<TensorMap, HostError> {
        Ok(self.loader.load_raw(file.path())?)
    }

    fn merge(
        &self,
        model: &MergeLog,
        clip: &MergeLog,
        tensors: &TensorMap,
        model_strength: f64,
        clip_strength: f64,
    ) -> Result<(MergeLog, MergeLog), HostError> {
        if tensors.is_empty() {
            return Err(HostError::Merge("no tensors to merge".to_string()));
        }

        let record = MergeRecord {
            tensors: tensors.len(),
            model_strength,
            clip_strength,
        };
        debug!(
            tensors = record.tensors,
            model_strength, clip_strength, "Dry-run merge"
        );

        let mut model = model.clone();
        let mut clip = clip.clone();
        model.merges.push(record.clone());
        clip.merges.push(record);
        Ok((model, clip))
    }

    fn encode(&self, _clip: &MergeLog, text: &str) -> Result<String, HostError> {
        Ok(text.to_string())
    }
}
