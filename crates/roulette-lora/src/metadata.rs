//! LoRA metadata schema
//!
//! Sidecar files written by model managers and the records rebuilt from
//! embedded safetensors headers share this shape. Parsing is lenient: a
//! `null`, a list containing non-strings or a malformed sample image never
//! rejects the whole record.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;

/// Where a record was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataSource {
    /// `<name>.metadata.json`
    MetadataJson,
    /// `<name>.info`
    Info,
    /// The LoRA file's own header
    Embedded,
}

impl MetadataSource {
    /// Sidecar sources in lookup order
    pub const SIDECARS: [MetadataSource; 2] = [Self::MetadataJson, Self::Info];

    /// File suffix for sidecar sources
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            Self::MetadataJson => Some(".metadata.json"),
            Self::Info => Some(".info"),
            Self::Embedded => None,
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MetadataJson => "metadata.json",
            Self::Info => "info",
            Self::Embedded => "embedded header",
        }
    }
}

/// A metadata record and its origin
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMetadata {
    /// The record
    pub record: MetadataRecord,
    /// Which source supplied it
    pub source: MetadataSource,
    /// File it was read from
    pub path: PathBuf,
}

/// Top-level metadata record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataRecord {
    /// Display name
    #[serde(deserialize_with = "lenient_string")]
    pub model_name: Option<String>,

    /// Tag list
    #[serde(deserialize_with = "lenient_strings")]
    pub tags: Vec<String>,

    /// Model-hub section
    #[serde(deserialize_with = "null_as_default")]
    pub civitai: CivitaiInfo,
}

/// Nested model-hub section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CivitaiInfo {
    /// Version display name
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,

    /// Trained-word patterns; each may hold several comma-separated words
    #[serde(rename = "trainedWords", deserialize_with = "lenient_strings")]
    pub trained_words: Vec<String>,

    /// Parent model information
    #[serde(deserialize_with = "null_as_default")]
    pub model: ModelInfo,

    /// Sample images
    #[serde(deserialize_with = "lenient_images")]
    pub images: Vec<SampleImage>,
}

/// Parent model information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelInfo {
    /// Model name
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,

    /// Model tags
    #[serde(deserialize_with = "lenient_strings")]
    pub tags: Vec<String>,
}

/// Sample image entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleImage {
    /// Generation parameters, when published
    pub meta: Option<SampleMeta>,
}

/// Generation parameters of a sample image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleMeta {
    /// Positive prompt
    #[serde(deserialize_with = "lenient_string")]
    pub prompt: Option<String>,

    /// Negative prompt
    #[serde(rename = "negativePrompt", deserialize_with = "lenient_string")]
    pub negative_prompt: Option<String>,
}

impl SampleMeta {
    /// Whether either prompt carries text
    pub fn has_prompt(&self) -> bool {
        let filled = |s: &Option<String>| s.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.prompt) || filled(&self.negative_prompt)
    }
}

impl MetadataRecord {
    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Trained-word patterns
    pub fn trained_words(&self) -> &[String] {
        &self.civitai.trained_words
    }

    /// Sample prompts that carry text
    pub fn sample_prompts(&self) -> Vec<&SampleMeta> {
        self.civitai
            .images
            .iter()
            .filter_map(|image| image.meta.as_ref())
            .filter(|meta| meta.has_prompt())
            .collect()
    }

    /// Lower-cased, space-joined text searched by metadata-scope filters
    ///
    /// Order: display name, section name, trained words, model name,
    /// model tags, top-level tags; deduplicated ignoring case.
    pub fn keyword_text(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        parts.extend(self.model_name.clone());
        parts.extend(self.civitai.name.clone());
        parts.extend(dedupe_ignore_case(
            self.civitai
                .trained_words
                .iter()
                .flat_map(|pattern| split_words(pattern)),
        ));
        parts.extend(self.civitai.model.name.clone());
        parts.extend(self.civitai.model.tags.iter().cloned());
        parts.extend(self.tags.iter().cloned());

        dedupe_ignore_case(parts.iter().map(|p| p.trim()))
            .join(" ")
            .to_lowercase()
    }
}

/// Split a comma-separated pattern into trimmed, non-empty words
pub fn split_words(pattern: &str) -> Vec<&str> {
    pattern
        .split(',')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .collect()
}

/// Drop empty items and later items equal to an earlier one ignoring case
pub fn dedupe_ignore_case<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for item in items {
        let item = item.as_ref();
        if item.is_empty() {
            continue;
        }
        if seen.insert(item.to_lowercase()) {
            unique.push(item.to_string());
        }
    }
    unique
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    })
}

fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(values) => values
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Value::String(s) => vec![s],
        _ => Vec::new(),
    })
}

fn lenient_images<'de, D>(deserializer: D) -> Result<Vec<SampleImage>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(values) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(values
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(mut entry) => Some(SampleImage {
                meta: match entry.remove("meta") {
                    Some(meta @ Value::Object(_)) => serde_json::from_value(meta).ok(),
                    _ => None,
                },
            }),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIDECAR: &str = r#"{
        "model_name": "Anime Lineart",
        "tags": ["style", "Anime"],
        "civitai": {
            "name": "v2.0",
            "trainedWords": ["lineart, monochrome", "Lineart, sketch"],
            "model": {"name": "Anime Lineart Style", "tags": ["anime", "lineart"]},
            "images": [
                {"url": "a.png", "meta": null},
                {"url": "b.png", "meta": {}},
                {"url": "c.png", "meta": {"prompt": "1girl, <lora:lineart:0.8>", "negativePrompt": "lowres"}}
            ]
        }
    }"#;

    #[test]
    fn test_parse_sidecar() {
        let record = MetadataRecord::from_json_str(SIDECAR).unwrap();

        assert_eq!(record.model_name.as_deref(), Some("Anime Lineart"));
        assert_eq!(record.trained_words().len(), 2);
        assert_eq!(record.civitai.model.tags, vec!["anime", "lineart"]);
        assert_eq!(record.civitai.images.len(), 3);
        assert_eq!(record.sample_prompts().len(), 1);
    }

    #[test]
    fn test_lenient_fields() {
        let json = r#"{"model_name": null, "tags": ["a", 3, null, "b"], "civitai": {"model": null, "trainedWords": null}}"#;
        let record = MetadataRecord::from_json_str(json).unwrap();

        assert_eq!(record.model_name, None);
        assert_eq!(record.tags, vec!["a", "b"]);
        assert!(record.trained_words().is_empty());
        assert_eq!(record.civitai.model, ModelInfo::default());
    }

    #[test]
    fn test_malformed_images_keep_record() {
        let json = r#"{"civitai": {
            "trainedWords": ["red hair"],
            "images": [null, {"meta": "x"}, {"meta": ["a", "b"]}, 7, {"meta": {"prompt": "p"}}]
        }}"#;
        let record = MetadataRecord::from_json_str(json).unwrap();

        assert_eq!(record.trained_words(), &["red hair".to_string()]);
        assert_eq!(record.civitai.images.len(), 3);
        assert_eq!(record.civitai.images[0].meta, None);
        assert_eq!(record.civitai.images[1].meta, None);
        assert_eq!(record.sample_prompts().len(), 1);
        assert_eq!(record.sample_prompts()[0].prompt.as_deref(), Some("p"));

        let json = r#"{"civitai": {"trainedWords": ["red hair"], "images": {"meta": {}}}}"#;
        let record = MetadataRecord::from_json_str(json).unwrap();
        assert!(record.civitai.images.is_empty());
    }

    #[test]
    fn test_keyword_text() {
        let record = MetadataRecord::from_json_str(SIDECAR).unwrap();
        assert_eq!(
            record.keyword_text(),
            "anime lineart v2.0 lineart monochrome sketch anime lineart style anime style"
        );
    }

    #[test]
    fn test_keyword_text_empty() {
        assert_eq!(MetadataRecord::default().keyword_text(), "");
    }

    #[test]
    fn test_dedupe_ignore_case() {
        let words = dedupe_ignore_case(["Red", "blue", "", "RED", "Blue", "green"]);
        assert_eq!(words, vec!["Red", "blue", "green"]);
    }

    #[test]
    fn test_split_words() {
        assert_eq!(split_words(" a, b ,,c "), vec!["a", "b", "c"]);
        assert!(split_words(" , ").is_empty());
    }
}
