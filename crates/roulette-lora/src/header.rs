//! Embedded safetensors header metadata
//!
//! Training tools write string metadata into the safetensors header. The
//! fields relevant here are reshaped into a [`MetadataRecord`]:
//!
//! - `ss_tag_frequency`: per-dataset tag counts; the 20 most frequent tags of
//!   each dataset are joined into one trained-word pattern
//! - `modelspec.trigger_word`: used only when no tag frequencies exist
//! - `ss_output_name`: the display name

use crate::metadata::{dedupe_ignore_case, MetadataRecord};
use memmap2::Mmap;
use safetensors::SafeTensors;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Tags kept per dataset
pub const TOP_TAGS_PER_DATASET: usize = 20;

const TAG_FREQUENCY_KEY: &str = "ss_tag_frequency";
const TRIGGER_WORD_KEY: &str = "modelspec.trigger_word";
const OUTPUT_NAME_KEY: &str = "ss_output_name";

/// Header read errors
#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid safetensors header: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),
}

/// Read the raw string metadata of a safetensors file
///
/// Returns an empty map for files that are not safetensors.
pub fn read_header_metadata(path: &Path) -> Result<HashMap<String, String>, HeaderError> {
    let is_safetensors = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("safetensors"));
    if !is_safetensors {
        return Ok(HashMap::new());
    }

    let file = File::open(path)?;
    // SAFETY: the map is read-only and dropped before this function returns.
    let buffer = unsafe { Mmap::map(&file)? };
    let (_, metadata) = SafeTensors::read_metadata(&buffer)?;

    Ok(metadata.metadata().clone().unwrap_or_default())
}

/// Read and reshape the embedded metadata of a LoRA file
///
/// `Ok(None)` when the header carries no trigger words.
pub fn read_embedded(path: &Path) -> Result<Option<MetadataRecord>, HeaderError> {
    let raw = read_header_metadata(path)?;
    Ok(record_from_header(&raw))
}

/// Reshape raw header metadata into a record
pub fn record_from_header(raw: &HashMap<String, String>) -> Option<MetadataRecord> {
    let mut record = MetadataRecord::default();

    if let Some(tags) = raw.get(TAG_FREQUENCY_KEY).and_then(|s| top_tags(s)) {
        record.civitai.trained_words = vec![tags];
    }

    if record.civitai.trained_words.is_empty() {
        if let Some(trigger) = raw.get(TRIGGER_WORD_KEY).filter(|t| !t.is_empty()) {
            record.civitai.trained_words = vec![trigger.clone()];
        }
    }

    if let Some(name) = raw.get(OUTPUT_NAME_KEY).filter(|n| !n.is_empty()) {
        record.model_name = Some(name.clone());
    }

    if record.civitai.trained_words.is_empty() {
        None
    } else {
        Some(record)
    }
}

/// Most frequent tags per dataset, deduplicated and comma-joined
fn top_tags(tag_frequency: &str) -> Option<String> {
    let datasets: Map<String, Value> = serde_json::from_str(tag_frequency).ok()?;

    let mut all_tags: Vec<&str> = Vec::new();
    for counts in datasets.values() {
        let Some(counts) = counts.as_object() else {
            continue;
        };
        let mut sorted: Vec<(&str, f64)> = counts
            .iter()
            .map(|(tag, freq)| (tag.as_str(), freq.as_f64().unwrap_or(0.0)))
            .collect();
        // Stable sort keeps header order among equal counts
        sorted.sort_by(|a, b| b.1.total_cmp(&a.1));
        all_tags.extend(
            sorted
                .into_iter()
                .take(TOP_TAGS_PER_DATASET)
                .map(|(tag, _)| tag.trim()),
        );
    }

    let unique = dedupe_ignore_case(all_tags);
    if unique.is_empty() {
        None
    } else {
        Some(unique.join(", "))
    }
}
