//! Inspect command

use roulette_core::{LoraFile, TriggerSource};
use roulette_lora::{assemble, CacheConfig, MetadataCache, MetadataResolver};
use roulette_pipeline::seeded_rng;
use std::path::Path;

pub fn run(path: &Path) {
    let file = LoraFile::new(path);
    let resolver = MetadataResolver::new(MetadataCache::shared(CacheConfig::default()));
    let mut warnings = Vec::new();

    println!("LoRA: {}", file.name());
    println!("==============================");
    println!("Path: {}", file.path().display());

    let resolved = resolver.resolve(&file).absorb(&mut warnings);
    match &resolved {
        Some(resolved) => {
            println!(
                "Metadata: {} ({})",
                resolved.source.display_name(),
                resolved.path.display()
            );
        }
        None => println!("Metadata: none"),
    }

    let keywords = resolver.keyword_text(&file).absorb(&mut warnings);
    println!();
    println!("Search text:");
    println!("  {}", if keywords.is_empty() { "-" } else { keywords.as_str() });

    let triggers = assemble(
        resolved.as_ref().map(|r| &r.record),
        TriggerSource::Combined,
        &mut seeded_rng(0),
    );
    println!();
    println!("Trigger words:");
    println!(
        "  {}",
        if triggers.positive.is_empty() {
            "-"
        } else {
            triggers.positive.as_str()
        }
    );

    if !warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &warnings {
            println!("  - {}", warning);
        }
    }
}
