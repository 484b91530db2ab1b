//! Roulette Pipeline - Seeded LoRA Selection Runs
//!
//! This crate drives a selection request end to end: it samples files from
//! each group, resolves strengths and trigger text, merges every pick through
//! a [`ModelHost`] and builds the preview batch.
//!
//! # Run Architecture
//!
//! ```text
//! SelectionRequest → [Group 1] → [Group 2] → ... → [Group N] → EngineOutput
//!                        ↑           ↑                 ↑
//!                     reseed      reseed            reseed
//! ```
//!
//! Handles flow from group to group; a failed merge leaves them untouched.

pub mod config;
pub mod engine;
pub mod host;
pub mod preview;
pub mod sampler;
pub mod strength;

// Re-export commonly used types
pub use config::{ConfigError, EngineConfig, StrengthConfig};
pub use engine::{EngineBuilder, EngineOutput, SelectionEngine};
pub use host::{DryRunHost, HostError, MergeLog, MergeRecord, ModelHost};
pub use preview::{PreviewBatch, PreviewConfig};
pub use sampler::{seeded_rng, select, select_seeded};
pub use strength::{StrengthParser, FALLBACK_STRENGTH};
