//! Roulette Core - Data model for seeded LoRA selection
//!
//! Roulette picks LoRA files from a folder tree, resolves their metadata into
//! trigger text, and optionally weights them per UNet block before they are
//! merged into a model.
//!
//! # Run Overview
//!
//! ```text
//! folder → catalog → filter → dedup → sampler → per item:
//!                                                 strength
//!                                                 trigger text
//!                                                 block weights → merge
//! ```
//!
//! This crate holds the types that flow between those stages. Nothing in a
//! run is fatal: recoverable problems become [`Warning`]s carried in an
//! [`Outcome`].

pub mod capability;
pub mod file;
pub mod request;
pub mod selection;
pub mod warning;

// Re-export commonly used types
pub use capability::EngineCapabilities;
pub use file::LoraFile;
pub use request::{
    BlockPreset, BlockWeightSpec, FilterMode, GroupRequest, KeywordFilterSpec, ParseModeError,
    SearchScope, SelectionRequest, TriggerSource, WeightMode,
};
pub use selection::{format_decimal, BlockWeightVector, SelectedLora, SelectionResult};
pub use warning::{Outcome, Warning};
