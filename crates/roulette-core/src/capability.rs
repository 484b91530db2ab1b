//! Engine capability set
//!
//! One engine covers the plain, filtered and block-weighted selection
//! variants. Which of the optional stages run is decided by the flags here.

use bitflags::bitflags;

bitflags! {
    /// Optional stages an engine is allowed to run
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EngineCapabilities: u8 {
        /// Keyword filtering of the candidate pool
        const FILTERING    = 0b0000_0001;
        /// Per-block weighting of UNet tensors
        const BLOCK_WEIGHT = 0b0000_0010;
    }
}

impl EngineCapabilities {
    /// Sampling, strengths and trigger words only
    pub fn plain() -> Self {
        Self::empty()
    }

    /// Plain selection plus keyword filtering
    pub fn filtered() -> Self {
        Self::FILTERING
    }

    /// Everything
    pub fn full() -> Self {
        Self::FILTERING | Self::BLOCK_WEIGHT
    }

    /// Whether keyword filtering runs
    pub fn filtering(&self) -> bool {
        self.contains(Self::FILTERING)
    }

    /// Whether block weighting runs
    pub fn block_weight(&self) -> bool {
        self.contains(Self::BLOCK_WEIGHT)
    }
}

impl Default for EngineCapabilities {
    fn default() -> Self {
        Self::full()
    }
}
