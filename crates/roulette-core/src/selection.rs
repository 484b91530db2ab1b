//! Selection results

use crate::file::LoraFile;
use serde::{Deserialize, Serialize};

/// Per-block multipliers, one per UNet block group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockWeightVector(Vec<f64>);

impl BlockWeightVector {
    /// Wrap a list of multipliers
    pub fn new(weights: Vec<f64>) -> Self {
        Self(weights)
    }

    /// Multipliers as a slice
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Comma list as written in `lbw=` notation
    pub fn to_notation(&self) -> String {
        self.0
            .iter()
            .map(|w| w.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// One selected LoRA and everything resolved for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedLora {
    /// The file
    pub file: LoraFile,
    /// Label of the group it was drawn from
    pub group: Option<String>,
    /// Resolved model strength
    pub model_strength: f64,
    /// Resolved clip strength
    pub clip_strength: f64,
    /// Trigger text (positive)
    pub trigger: String,
    /// Negative prompt text, only set by sample prompts
    pub negative: String,
    /// Block weights used for this item, if any
    pub block_weights: Option<BlockWeightVector>,
    /// Whether the merge succeeded
    pub applied: bool,
}

impl SelectedLora {
    /// `<lora:NAME:MODEL:CLIP>` or `<lora:NAME:MODEL:CLIP:lbw=...>`
    pub fn notation(&self) -> String {
        let name = self.file.name();
        let model = format_decimal(self.model_strength);
        let clip = format_decimal(self.clip_strength);
        match &self.block_weights {
            Some(weights) => format!(
                "<lora:{}:{}:{}:lbw={}>",
                name,
                model,
                clip,
                weights.to_notation()
            ),
            None => format!("<lora:{}:{}:{}>", name, model, clip),
        }
    }

    /// Notation followed by the trigger text, if any
    pub fn prompt_fragment(&self) -> String {
        if self.trigger.is_empty() {
            self.notation()
        } else {
            format!("{}, {}", self.notation(), self.trigger)
        }
    }
}

/// Outcome of a selection run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    /// Selected items in application order
    pub items: Vec<SelectedLora>,
    /// Aggregated positive text, notation included
    pub positive_text: String,
    /// Aggregated negative text
    pub negative_text: String,
}

impl SelectionResult {
    /// Number of selected items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if nothing was selected
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items whose merge succeeded
    pub fn applied_count(&self) -> usize {
        self.items.iter().filter(|i| i.applied).count()
    }
}

/// Render a strength with at least one decimal digit
pub fn format_decimal(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}
