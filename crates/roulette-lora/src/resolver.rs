//! Cascading metadata resolution
//!
//! Sources are tried in a fixed order and the first hit wins:
//!
//! 1. `<name>.metadata.json`
//! 2. `<name>.info`
//! 3. the safetensors header of the LoRA itself
//!
//! A sidecar that exists but cannot be read or parsed is reported and skipped.

use crate::cache::SharedMetadataCache;
use crate::header;
use crate::metadata::{MetadataRecord, MetadataSource, ResolvedMetadata};
use roulette_core::{LoraFile, Outcome, Warning};
use std::path::Path;
use tracing::debug;

/// Resolves LoRA metadata through a shared cache
#[derive(Clone)]
pub struct MetadataResolver {
    cache: SharedMetadataCache,
}

impl MetadataResolver {
    /// Create a resolver over a cache
    pub fn new(cache: SharedMetadataCache) -> Self {
        Self { cache }
    }

    /// The cache handle
    pub fn cache(&self) -> &SharedMetadataCache {
        &self.cache
    }

    /// Resolve metadata, consulting the cache first
    pub fn resolve(&self, file: &LoraFile) -> Outcome<Option<ResolvedMetadata>> {
        if let Some(cached) = self.cache.lock().get_record(file.path()) {
            return Outcome::clean(cached);
        }

        let outcome = Self::resolve_uncached(file);
        self.cache
            .lock()
            .insert_record(file.path(), outcome.value.clone());
        outcome
    }

    /// Resolve metadata from disk without touching the cache
    pub fn resolve_uncached(file: &LoraFile) -> Outcome<Option<ResolvedMetadata>> {
        let mut outcome = Outcome::clean(None);

        for source in MetadataSource::SIDECARS {
            let Some(suffix) = source.suffix() else {
                continue;
            };
            let path = file.sibling(suffix);
            if !path.is_file() {
                continue;
            }
            match read_sidecar(&path) {
                Ok(record) => {
                    debug!(path = %path.display(), source = source.display_name(), "Resolved metadata");
                    outcome.value = Some(ResolvedMetadata {
                        record,
                        source,
                        path,
                    });
                    return outcome;
                }
                Err(reason) => outcome.warn(Warning::SidecarUnreadable { path, reason }),
            }
        }

        let embedded = Self::read_embedded(file);
        outcome.value = embedded.absorb(&mut outcome.warnings).map(|record| ResolvedMetadata {
            record,
            source: MetadataSource::Embedded,
            path: file.path().to_path_buf(),
        });
        outcome
    }

    /// The record rebuilt from the embedded header, ignoring sidecars
    pub fn embedded_only(&self, file: &LoraFile) -> Outcome<Option<MetadataRecord>> {
        Self::read_embedded(file)
    }

    /// Keyword search text, cached separately from the record
    ///
    /// An empty string is cached too, so files without metadata are read once.
    pub fn keyword_text(&self, file: &LoraFile) -> Outcome<String> {
        if let Some(keywords) = self.cache.lock().get_keywords(file.path()) {
            return Outcome::clean(keywords);
        }

        let outcome = self.resolve(file).map(|resolved| {
            resolved
                .map(|r| r.record.keyword_text())
                .unwrap_or_default()
        });
        self.cache
            .lock()
            .insert_keywords(file.path(), outcome.value.clone());
        outcome
    }

    fn read_embedded(file: &LoraFile) -> Outcome<Option<MetadataRecord>> {
        match header::read_embedded(file.path()) {
            Ok(record) => Outcome::clean(record),
            Err(e) => Outcome::warned(
                None,
                Warning::HeaderUnreadable {
                    path: file.path().to_path_buf(),
                    reason: e.to_string(),
                },
            ),
        }
    }
}

fn read_sidecar(path: &Path) -> Result<MetadataRecord, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    MetadataRecord::from_json_str(&content).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, MetadataCache};
    use crate::header::tests::write_safetensors;
    use std::fs;
    use tempfile::TempDir;

    fn resolver() -> MetadataResolver {
        MetadataResolver::new(MetadataCache::shared(CacheConfig::default()))
    }

    fn lora(dir: &TempDir, name: &str) -> LoraFile {
        let path = dir.path().join(format!("{}.safetensors", name));
        write_safetensors(
            &path,
            &[("modelspec.trigger_word", "embedded word"), ("ss_output_name", name)],
        );
        LoraFile::new(path)
    }

    #[test]
    fn test_metadata_json_wins() {
        let dir = TempDir::new().unwrap();
        let file = lora(&dir, "anime");
        fs::write(
            file.sibling(".metadata.json"),
            r#"{"model_name": "from metadata.json"}"#,
        )
        .unwrap();
        fs::write(file.sibling(".info"), r#"{"model_name": "from info"}"#).unwrap();

        let resolved = resolver().resolve(&file).value.unwrap();
        assert_eq!(resolved.source, MetadataSource::MetadataJson);
        assert_eq!(
            resolved.record.model_name.as_deref(),
            Some("from metadata.json")
        );
    }

    #[test]
    fn test_info_fallback() {
        let dir = TempDir::new().unwrap();
        let file = lora(&dir, "anime");
        fs::write(file.sibling(".info"), r#"{"model_name": "from info"}"#).unwrap();

        let resolved = resolver().resolve(&file).value.unwrap();
        assert_eq!(resolved.source, MetadataSource::Info);
    }

    #[test]
    fn test_malformed_sidecar_falls_through() {
        let dir = TempDir::new().unwrap();
        let file = lora(&dir, "anime");
        fs::write(file.sibling(".metadata.json"), "{ not json").unwrap();
        fs::write(file.sibling(".info"), r#"{"model_name": "from info"}"#).unwrap();

        let outcome = resolver().resolve(&file);
        assert_eq!(outcome.value.unwrap().source, MetadataSource::Info);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(matches!(
            outcome.warnings[0],
            Warning::SidecarUnreadable { .. }
        ));
    }

    #[test]
    fn test_embedded_fallback() {
        let dir = TempDir::new().unwrap();
        let file = lora(&dir, "anime");

        let resolved = resolver().resolve(&file).value.unwrap();
        assert_eq!(resolved.source, MetadataSource::Embedded);
        assert_eq!(resolved.record.trained_words(), &["embedded word".to_string()]);
        assert_eq!(resolved.record.model_name.as_deref(), Some("anime"));
    }

    #[test]
    fn test_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bare.pt");
        fs::write(&path, b"x").unwrap();

        let outcome = resolver().resolve(&LoraFile::new(path));
        assert!(outcome.value.is_none());
        assert!(!outcome.has_warnings());
    }

    #[test]
    fn test_embedded_only_ignores_sidecars() {
        let dir = TempDir::new().unwrap();
        let file = lora(&dir, "anime");
        fs::write(
            file.sibling(".metadata.json"),
            r#"{"civitai": {"trainedWords": ["sidecar word"]}}"#,
        )
        .unwrap();

        let record = resolver().embedded_only(&file).value.unwrap();
        assert_eq!(record.trained_words(), &["embedded word".to_string()]);
    }

    #[test]
    fn test_resolve_is_cached() {
        let dir = TempDir::new().unwrap();
        let file = lora(&dir, "anime");
        fs::write(file.sibling(".metadata.json"), r#"{"model_name": "first"}"#).unwrap();

        let resolver = resolver();
        assert_eq!(
            resolver.resolve(&file).value.unwrap().record.model_name.as_deref(),
            Some("first")
        );

        fs::write(file.sibling(".metadata.json"), r#"{"model_name": "second"}"#).unwrap();
        assert_eq!(
            resolver.resolve(&file).value.unwrap().record.model_name.as_deref(),
            Some("first")
        );
        assert_eq!(
            MetadataResolver::resolve_uncached(&file)
                .value
                .unwrap()
                .record
                .model_name
                .as_deref(),
            Some("second")
        );
    }

    #[test]
    fn test_keyword_text_cached() {
        let dir = TempDir::new().unwrap();
        let file = lora(&dir, "anime");
        fs::write(
            file.sibling(".metadata.json"),
            r#"{"model_name": "Anime Style", "tags": ["Cel"]}"#,
        )
        .unwrap();

        let resolver = resolver();
        assert_eq!(resolver.keyword_text(&file).value, "anime style cel");

        fs::remove_file(file.sibling(".metadata.json")).unwrap();
        assert_eq!(resolver.keyword_text(&file).value, "anime style cel");
    }
}
