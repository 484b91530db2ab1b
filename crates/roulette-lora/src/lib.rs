//! Roulette LoRA - Per-file LoRA handling
//!
//! Everything that looks at individual LoRA files: finding them, reading
//! their metadata, filtering them by keyword, turning metadata into trigger
//! text, and weighting their tensors per UNet block.
//!
//! # Metadata Sources
//!
//! Metadata for `<dir>/<name>.safetensors` is taken from the first of:
//!
//! - `<dir>/<name>.metadata.json`
//! - `<dir>/<name>.info`
//! - the safetensors header itself
//!
//! Lookups go through a [`SharedMetadataCache`] owned by the caller.

pub mod block_weight;
pub mod cache;
pub mod catalog;
pub mod header;
pub mod keyword;
pub mod loader;
pub mod metadata;
pub mod resolver;
pub mod trigger;

pub use block_weight::{
    apply_block_weights, block_index, build_vector, detect_topology, fit_vector, fixed_vector,
    preset_weights, TensorMap, UnetTopology,
};
pub use cache::{CacheConfig, CacheStats, MetadataCache, SharedMetadataCache};
pub use catalog::{dedupe, LoraCatalog, DEFAULT_EXTENSIONS};
pub use header::HeaderError;
pub use keyword::KeywordFilter;
pub use loader::{LoaderConfig, LoaderError, LoraLoader};
pub use metadata::{MetadataRecord, MetadataSource, ResolvedMetadata};
pub use resolver::MetadataResolver;
pub use trigger::{assemble, clean_prompt, record_for, strip_notation, TriggerText};
