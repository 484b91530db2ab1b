//! Structured warnings
//!
//! Nothing in a selection run is fatal. Conditions that the run recovers from
//! are reported as [`Warning`]s, logged when raised and carried alongside the
//! value in an [`Outcome`] so callers can surface them.

use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// A recoverable condition raised during a selection run
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Warning {
    #[error("folder not found: {}", .0.display())]
    FolderNotFound(PathBuf),

    #[error("no LoRA files found in {}", .0.display())]
    NoCandidates(PathBuf),

    #[error("no LoRAs matching filter '{0}'")]
    FilterEmptied(String),

    #[error("duplicate filename {name}: keeping {}, skipping {}", .kept.display(), .skipped.display())]
    DuplicateSkipped {
        name: String,
        kept: PathBuf,
        skipped: PathBuf,
    },

    #[error("requested {requested} LoRAs but only {available} available, adding {} duplicates", .requested - .available)]
    PoolShortfall { requested: usize, available: usize },

    #[error("failed to read {}: {reason}", .path.display())]
    SidecarUnreadable { path: PathBuf, reason: String },

    #[error("failed to read embedded metadata from {}: {reason}", .path.display())]
    HeaderUnreadable { path: PathBuf, reason: String },

    #[error("invalid strength '{spec}': {reason}, using 1.0")]
    InvalidStrength { spec: String, reason: String },

    #[error("invalid block weights '{input}': {reason}, using no weighting")]
    InvalidBlockWeights { input: String, reason: String },

    #[error("LoRA is {topology} but got {supplied} weights (expected {expected}), adjusting")]
    BlockWeightsAdjusted {
        topology: String,
        supplied: usize,
        expected: usize,
    },

    #[error("failed to apply LoRA {}: {reason}", .path.display())]
    MergeFailed { path: PathBuf, reason: String },

    #[error("failed to load preview {}: {reason}", .path.display())]
    PreviewFailed { path: PathBuf, reason: String },

    #[error("failed to encode {which} text: {reason}")]
    EncodeFailed { which: String, reason: String },
}

/// A value together with the warnings raised while producing it
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    /// The produced value (possibly a documented default)
    pub value: T,
    /// Warnings in the order they were raised
    pub warnings: Vec<Warning>,
}

impl<T> Outcome<T> {
    /// An outcome with no warnings
    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// An outcome carrying a single warning
    pub fn warned(value: T, warning: Warning) -> Self {
        let mut outcome = Self::clean(value);
        outcome.warn(warning);
        outcome
    }

    /// Log and record a warning
    pub fn warn(&mut self, warning: Warning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Whether any warning was raised
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Transform the value, keeping the warnings
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            warnings: self.warnings,
        }
    }

    /// Move the warnings into `sink` and return the value
    pub fn absorb(self, sink: &mut Vec<Warning>) -> T {
        sink.extend(self.warnings);
        self.value
    }

    /// Split into value and warnings
    pub fn into_parts(self) -> (T, Vec<Warning>) {
        (self.value, self.warnings)
    }
}

impl<T: Default> Default for Outcome<T> {
    fn default() -> Self {
        Self::clean(T::default())
    }
}
