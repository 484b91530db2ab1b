//! Trigger text assembly
//!
//! Turns a resolved metadata record into the text a selected LoRA contributes
//! to the prompts. Random modes draw from the caller's random source so the
//! result is reproducible for a seed.

use crate::metadata::{dedupe_ignore_case, split_words, MetadataRecord};
use crate::resolver::MetadataResolver;
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use roulette_core::{LoraFile, Outcome, TriggerSource};

static NOTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<lora:[^>]+>").expect("notation pattern is valid"));
static REPEATED_COMMAS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*,\s*,+\s*").expect("comma pattern is valid"));
static EDGE_COMMAS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*,\s*|\s*,\s*$").expect("edge comma pattern is valid"));
static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Text contributed by one LoRA
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerText {
    /// Positive prompt fragment
    pub positive: String,
    /// Negative prompt fragment, only filled from sample prompts
    pub negative: String,
}

impl TriggerText {
    fn positive(text: String) -> Self {
        Self {
            positive: text,
            negative: String::new(),
        }
    }
}

/// Remove `<lora:...>` notation from text
pub fn strip_notation(text: &str) -> String {
    NOTATION.replace_all(text, "").into_owned()
}

/// Remove notation and tidy the commas and whitespace it leaves behind
pub fn clean_prompt(text: &str) -> String {
    let text = strip_notation(text);
    let text = REPEATED_COMMAS.replace_all(&text, ", ");
    let text = EDGE_COMMAS.replace_all(&text, "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Words of one trained-word pattern with notation removed
fn pattern_words(pattern: &str) -> Vec<String> {
    split_words(&strip_notation(pattern))
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Look up the record a trigger source reads from
///
/// `MetadataOnly` skips the sidecars and reads the embedded header.
pub fn record_for(
    resolver: &MetadataResolver,
    file: &LoraFile,
    source: TriggerSource,
) -> Outcome<Option<MetadataRecord>> {
    match source {
        TriggerSource::MetadataOnly => resolver.embedded_only(file),
        _ => resolver
            .resolve(file)
            .map(|resolved| resolved.map(|r| r.record)),
    }
}

/// Assemble the trigger text of one record
///
/// `Random` and `SamplePrompt` make one draw from `rng`, and only when the
/// record has something to draw from.
pub fn assemble<R: Rng + ?Sized>(
    record: Option<&MetadataRecord>,
    source: TriggerSource,
    rng: &mut R,
) -> TriggerText {
    let Some(record) = record else {
        return TriggerText::default();
    };

    match source {
        TriggerSource::Combined => TriggerText::positive(
            dedupe_ignore_case(
                record
                    .trained_words()
                    .iter()
                    .flat_map(|pattern| pattern_words(pattern)),
            )
            .join(", "),
        ),
        TriggerSource::Random => record
            .trained_words()
            .choose(rng)
            .map(|pattern| {
                TriggerText::positive(dedupe_ignore_case(pattern_words(pattern)).join(", "))
            })
            .unwrap_or_default(),
        TriggerSource::SamplePrompt => record
            .sample_prompts()
            .choose(rng)
            .map(|meta| TriggerText {
                positive: clean_prompt(meta.prompt.as_deref().unwrap_or_default()),
                negative: clean_prompt(meta.negative_prompt.as_deref().unwrap_or_default()),
            })
            .unwrap_or_default(),
        TriggerSource::MetadataOnly => TriggerText::positive(
            record
                .trained_words()
                .first()
                .cloned()
                .unwrap_or_default(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, MetadataCache};
    use crate::header::tests::write_safetensors;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;
    use tempfile::TempDir;

    fn record() -> MetadataRecord {
        MetadataRecord::from_json_str(
            r#"{
                "civitai": {
                    "trainedWords": ["red hair, smile, Red Hair", "blue eyes", "smile,  freckles"],
                    "images": [
                        {"meta": null},
                        {"meta": {"prompt": "<lora:redhead:0.8>, 1girl, , red hair", "negativePrompt": "lowres,, bad hands"}},
                        {"meta": {"prompt": "portrait <lora:x:1>", "negativePrompt": ""}}
                    ]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_clean_prompt() {
        assert_eq!(
            clean_prompt("<lora:a:0.8>, 1girl, , red   hair,"),
            "1girl, red hair"
        );
        assert_eq!(clean_prompt("masterpiece<lora:b:1:1>"), "masterpiece");
        assert_eq!(clean_prompt(""), "");
        assert_eq!(strip_notation("a <lora:x:1> b"), "a  b");
    }

    #[test]
    fn test_combined() {
        let mut rng = StdRng::seed_from_u64(0);
        let text = assemble(Some(&record()), TriggerSource::Combined, &mut rng);
        assert_eq!(text.positive, "red hair, smile, blue eyes, freckles");
        assert!(text.negative.is_empty());
    }

    #[test]
    fn test_random_picks_one_pattern() {
        let expected = ["red hair, smile", "blue eyes", "smile, freckles"];
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let text = assemble(Some(&record()), TriggerSource::Random, &mut rng);
            assert!(expected.contains(&text.positive.as_str()), "{}", text.positive);
        }
    }

    #[test]
    fn test_random_is_deterministic() {
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            assemble(Some(&record()), TriggerSource::Random, &mut rng)
        };
        assert_eq!(draw(42), draw(42));
    }

    #[test]
    fn test_sample_prompt() {
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let text = assemble(Some(&record()), TriggerSource::SamplePrompt, &mut rng);
            match text.positive.as_str() {
                "1girl, red hair" => assert_eq!(text.negative, "lowres, bad hands"),
                "portrait" => assert_eq!(text.negative, ""),
                other => panic!("unexpected prompt {}", other),
            }
        }
    }

    #[test]
    fn test_trained_words_drop_notation() {
        let record = MetadataRecord::from_json_str(
            r#"{"civitai": {"trainedWords": ["<lora:other:0.7>, red hair", "smile <lora:x:1>"]}}"#,
        )
        .unwrap();

        let mut rng = StdRng::seed_from_u64(0);
        let combined = assemble(Some(&record), TriggerSource::Combined, &mut rng);
        assert_eq!(combined.positive, "red hair, smile");

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let text = assemble(Some(&record), TriggerSource::Random, &mut rng);
            assert!(!text.positive.contains("<lora:"), "{}", text.positive);
            assert!(["red hair", "smile"].contains(&text.positive.as_str()));
        }
    }

    #[test]
    fn test_metadata_only_verbatim() {
        let mut rng = StdRng::seed_from_u64(0);
        let text = assemble(Some(&record()), TriggerSource::MetadataOnly, &mut rng);
        assert_eq!(text.positive, "red hair, smile, Red Hair");
    }

    #[test]
    fn test_absent_record_and_fields() {
        let mut rng = StdRng::seed_from_u64(0);
        for source in [
            TriggerSource::Combined,
            TriggerSource::Random,
            TriggerSource::SamplePrompt,
            TriggerSource::MetadataOnly,
        ] {
            assert_eq!(assemble(None, source, &mut rng), TriggerText::default());
            assert_eq!(
                assemble(Some(&MetadataRecord::default()), source, &mut rng),
                TriggerText::default()
            );
        }
    }

    #[test]
    fn test_empty_record_consumes_no_draws() {
        let mut used = StdRng::seed_from_u64(9);
        let mut fresh = StdRng::seed_from_u64(9);
        assemble(Some(&MetadataRecord::default()), TriggerSource::Random, &mut used);
        assert_eq!(used.gen::<u64>(), fresh.gen::<u64>());
    }

    #[test]
    fn test_record_for_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("anime.safetensors");
        write_safetensors(&path, &[("modelspec.trigger_word", "embedded")]);
        fs::write(
            dir.path().join("anime.metadata.json"),
            r#"{"civitai": {"trainedWords": ["sidecar"]}}"#,
        )
        .unwrap();

        let resolver = MetadataResolver::new(MetadataCache::shared(CacheConfig::default()));
        let file = LoraFile::new(path);

        let sidecar = record_for(&resolver, &file, TriggerSource::Combined).value.unwrap();
        assert_eq!(sidecar.trained_words(), &["sidecar".to_string()]);

        let embedded = record_for(&resolver, &file, TriggerSource::MetadataOnly)
            .value
            .unwrap();
        assert_eq!(embedded.trained_words(), &["embedded".to_string()]);
    }
}
