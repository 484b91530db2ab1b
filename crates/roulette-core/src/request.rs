//! Selection requests
//!
//! A request is immutable configuration for one run: one or more groups of
//! candidates plus the settings shared by all of them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// How keyword tokens combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Every token must match
    #[default]
    And,
    /// At least one token must match
    Or,
}

impl FromStr for FilterMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            _ => Err(ParseModeError::new("filter mode", s)),
        }
    }
}

/// What keyword tokens are matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// Lower-cased file name only
    #[default]
    Filename,
    /// File name plus resolved metadata text
    Metadata,
}

/// Where trigger text comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Every trained-word pattern, deduplicated
    #[default]
    Combined,
    /// One trained-word pattern at random
    Random,
    /// A random sample image prompt (positive and negative)
    SamplePrompt,
    /// First trained-word pattern from the embedded header only
    MetadataOnly,
}

impl FromStr for TriggerSource {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "combined" | "json_combined" => Ok(Self::Combined),
            "random" | "json_random" => Ok(Self::Random),
            "sample_prompt" | "json_sample_prompt" => Ok(Self::SamplePrompt),
            "metadata" | "metadata_only" => Ok(Self::MetadataOnly),
            _ => Err(ParseModeError::new("trigger word source", s)),
        }
    }
}

/// Named block-weight presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockPreset {
    /// Base and output blocks only
    StyleFocused,
    /// Base, early input blocks, middle and output blocks
    CharacterFocused,
    /// Input and middle blocks only
    StructureOnly,
    /// Early input, middle and early output blocks
    BalancedSoft,
}

impl BlockPreset {
    /// All presets, in the order random selection draws from
    pub const ALL: [BlockPreset; 4] = [
        Self::StyleFocused,
        Self::CharacterFocused,
        Self::StructureOnly,
        Self::BalancedSoft,
    ];

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::StyleFocused => "Style Focused",
            Self::CharacterFocused => "Character Focused",
            Self::StructureOnly => "Structure/Composition Only",
            Self::BalancedSoft => "Balanced / Soft",
        }
    }
}

impl fmt::Display for BlockPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// How the block-weight vector is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightMode {
    /// No block weighting
    #[default]
    Normal,
    /// A fixed named preset
    Preset(BlockPreset),
    /// A preset drawn at random for every selected item
    RandomPreset,
    /// User-supplied comma list
    Direct,
}

impl FromStr for WeightMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "none" | "normal (all 1.0)" => Ok(Self::Normal),
            "style" | "style focused" => Ok(Self::Preset(BlockPreset::StyleFocused)),
            "character" | "character focused" => Ok(Self::Preset(BlockPreset::CharacterFocused)),
            "structure" | "structure/composition only" => {
                Ok(Self::Preset(BlockPreset::StructureOnly))
            }
            "balanced" | "balanced / soft" => Ok(Self::Preset(BlockPreset::BalancedSoft)),
            "random" | "preset: random" => Ok(Self::RandomPreset),
            "direct" | "direct input" => Ok(Self::Direct),
            _ => Err(ParseModeError::new("weight mode", s)),
        }
    }
}

/// Block-weight settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockWeightSpec {
    /// Selection mode
    pub mode: WeightMode,
    /// Comma list used by [`WeightMode::Direct`]
    pub input: String,
}

impl BlockWeightSpec {
    /// No weighting
    pub fn normal() -> Self {
        Self::default()
    }

    /// A fixed preset
    pub fn preset(preset: BlockPreset) -> Self {
        Self {
            mode: WeightMode::Preset(preset),
            input: String::new(),
        }
    }

    /// A direct comma list
    pub fn direct(input: impl Into<String>) -> Self {
        Self {
            mode: WeightMode::Direct,
            input: input.into(),
        }
    }
}

/// Keyword filter settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordFilterSpec {
    /// Filter expression; quoted phrases and bare words
    pub expression: String,
    /// Token combination
    pub mode: FilterMode,
    /// Match target
    pub scope: SearchScope,
}

impl KeywordFilterSpec {
    /// Create a filter spec
    pub fn new(expression: impl Into<String>, mode: FilterMode, scope: SearchScope) -> Self {
        Self {
            expression: expression.into(),
            mode,
            scope,
        }
    }
}

/// One folder of candidates and how many to draw from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupRequest {
    /// Label used in logs
    pub label: Option<String>,
    /// Folder to search
    pub folder: PathBuf,
    /// Walk subfolders
    pub include_subfolders: bool,
    /// Drop later files whose name repeats an earlier one
    pub unique_by_filename: bool,
    /// Keyword filter
    pub filter: KeywordFilterSpec,
    /// Number of LoRAs to select
    pub count: usize,
    /// Model strength, scalar or `min-max`
    pub model_strength: String,
    /// Clip strength, scalar or `min-max`
    pub clip_strength: String,
}

impl Default for GroupRequest {
    fn default() -> Self {
        Self {
            label: None,
            folder: PathBuf::new(),
            include_subfolders: true,
            unique_by_filename: true,
            filter: KeywordFilterSpec::default(),
            count: 1,
            model_strength: "1.0".to_string(),
            clip_strength: "1.0".to_string(),
        }
    }
}

impl GroupRequest {
    /// Create a group for a folder
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            ..Default::default()
        }
    }

    /// Set the label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the count
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Set subfolder traversal
    pub fn with_subfolders(mut self, include: bool) -> Self {
        self.include_subfolders = include;
        self
    }

    /// Set deduplication
    pub fn with_unique_by_filename(mut self, unique: bool) -> Self {
        self.unique_by_filename = unique;
        self
    }

    /// Set the keyword filter
    pub fn with_filter(mut self, filter: KeywordFilterSpec) -> Self {
        self.filter = filter;
        self
    }

    /// Set both strength specs
    pub fn with_strengths(mut self, model: impl Into<String>, clip: impl Into<String>) -> Self {
        self.model_strength = model.into();
        self.clip_strength = clip.into();
        self
    }

    /// Name for log lines
    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.folder.display().to_string())
    }

    /// Whether the group has nothing to do
    pub fn is_inactive(&self) -> bool {
        self.count == 0 || self.folder.as_os_str().to_string_lossy().trim().is_empty()
    }
}

/// A complete selection request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionRequest {
    /// Candidate groups, processed in order
    pub groups: Vec<GroupRequest>,
    /// Trigger text source
    pub trigger_source: TriggerSource,
    /// Block-weight settings
    pub block_weight: BlockWeightSpec,
    /// Seed; every group re-seeds from it
    pub seed: u64,
    /// Text placed before the generated positive text
    pub additional_positive: String,
    /// Text placed before the collected negative text
    pub additional_negative: String,
}

impl SelectionRequest {
    /// A request with a single group
    pub fn single(group: GroupRequest) -> Self {
        Self {
            groups: vec![group],
            ..Default::default()
        }
    }

    /// Add a group
    pub fn with_group(mut self, group: GroupRequest) -> Self {
        self.groups.push(group);
        self
    }

    /// Set the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the trigger source
    pub fn with_trigger_source(mut self, source: TriggerSource) -> Self {
        self.trigger_source = source;
        self
    }

    /// Set block-weight settings
    pub fn with_block_weight(mut self, spec: BlockWeightSpec) -> Self {
        self.block_weight = spec;
        self
    }

    /// Set the additional prompts
    pub fn with_prompts(mut self, positive: impl Into<String>, negative: impl Into<String>) -> Self {
        self.additional_positive = positive.into();
        self.additional_negative = negative.into();
        self
    }
}

/// Unrecognised mode name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseModeError {
    kind: &'static str,
    value: String,
}

impl ParseModeError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("AND".parse::<FilterMode>().unwrap(), FilterMode::And);
        assert_eq!("or".parse::<FilterMode>().unwrap(), FilterMode::Or);
        assert!("xor".parse::<FilterMode>().is_err());

        assert_eq!(
            "json_sample_prompt".parse::<TriggerSource>().unwrap(),
            TriggerSource::SamplePrompt
        );
        assert_eq!(
            "sample-prompt".parse::<TriggerSource>().unwrap(),
            TriggerSource::SamplePrompt
        );
        assert_eq!(
            "metadata".parse::<TriggerSource>().unwrap(),
            TriggerSource::MetadataOnly
        );

        assert_eq!(
            "Style Focused".parse::<WeightMode>().unwrap(),
            WeightMode::Preset(BlockPreset::StyleFocused)
        );
        assert_eq!(
            "Preset: Random".parse::<WeightMode>().unwrap(),
            WeightMode::RandomPreset
        );
        assert_eq!("direct".parse::<WeightMode>().unwrap(), WeightMode::Direct);
    }

    #[test]
    fn test_group_defaults() {
        let group = GroupRequest::new("/loras");
        assert!(group.include_subfolders);
        assert!(group.unique_by_filename);
        assert_eq!(group.count, 1);
        assert_eq!(group.model_strength, "1.0");
        assert!(!group.is_inactive());

        assert!(GroupRequest::new("/loras").with_count(0).is_inactive());
        assert!(GroupRequest::new("  ").is_inactive());
    }

    #[test]
    fn test_request_from_json() {
        let json = r#"{
            "groups": [{"folder": "/loras", "count": 3, "model_strength": "0.4-0.8"}],
            "trigger_source": "sample_prompt",
            "block_weight": {"mode": {"preset": "style_focused"}},
            "seed": 42
        }"#;
        let request: SelectionRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.groups.len(), 1);
        assert_eq!(request.groups[0].count, 3);
        assert_eq!(request.groups[0].clip_strength, "1.0");
        assert_eq!(request.trigger_source, TriggerSource::SamplePrompt);
        assert_eq!(
            request.block_weight.mode,
            WeightMode::Preset(BlockPreset::StyleFocused)
        );
        assert_eq!(request.seed, 42);
    }
}
