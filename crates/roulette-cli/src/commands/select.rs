//! Select command

use clap::Args;
use roulette_core::{
    BlockWeightSpec, EngineCapabilities, FilterMode, GroupRequest, KeywordFilterSpec, SearchScope,
    SelectionRequest, TriggerSource, WeightMode,
};
use roulette_pipeline::{DryRunHost, EngineConfig, MergeLog, SelectionEngine};
use std::path::PathBuf;

#[derive(Args)]
pub struct SelectArgs {
    /// Folder to draw LoRAs from
    folder: PathBuf,

    /// Only look at the top level of the folder
    #[arg(long)]
    flat: bool,

    /// Keep files sharing a filename in different folders
    #[arg(long)]
    keep_duplicates: bool,

    /// Keyword filter expression
    #[arg(long, default_value = "")]
    filter: String,

    /// How filter tokens combine (and, or)
    #[arg(long, default_value = "and")]
    mode: FilterMode,

    /// Match the filter against metadata as well as file names
    #[arg(long)]
    search_metadata: bool,

    /// Number of LoRAs to select
    #[arg(short, long, default_value = "1")]
    count: usize,

    /// Model strength, a number or a range like 0.4-0.8
    #[arg(long, default_value = "1.0", allow_hyphen_values = true)]
    model_strength: String,

    /// Clip strength, a number or a range like 0.4-0.8
    #[arg(long, default_value = "1.0", allow_hyphen_values = true)]
    clip_strength: String,

    /// Block weighting (normal, style, character, structure, balanced, random, direct)
    #[arg(long, default_value = "normal")]
    weights: WeightMode,

    /// Comma list of block weights for direct mode
    #[arg(long, default_value = "")]
    lbw: String,

    /// Trigger word source (combined, random, sample-prompt, metadata)
    #[arg(long, default_value = "combined")]
    trigger: TriggerSource,

    /// Random seed
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Text placed before the selected LoRAs
    #[arg(long, default_value = "")]
    positive: String,

    /// Negative text placed before sample negatives
    #[arg(long, default_value = "")]
    negative: String,

    /// Engine configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl SelectArgs {
    fn request(&self) -> SelectionRequest {
        let scope = if self.search_metadata {
            SearchScope::Metadata
        } else {
            SearchScope::Filename
        };

        let group = GroupRequest::new(&self.folder)
            .with_subfolders(!self.flat)
            .with_unique_by_filename(!self.keep_duplicates)
            .with_filter(KeywordFilterSpec::new(&self.filter, self.mode, scope))
            .with_count(self.count)
            .with_strengths(&self.model_strength, &self.clip_strength);

        SelectionRequest::single(group)
            .with_trigger_source(self.trigger)
            .with_block_weight(BlockWeightSpec {
                mode: self.weights,
                input: self.lbw.clone(),
            })
            .with_seed(self.seed)
            .with_prompts(&self.positive, &self.negative)
    }
}

pub fn run(args: SelectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::headless(),
    };

    let engine = SelectionEngine::builder(DryRunHost::new(config.loader()))
        .config(config)
        .capabilities(EngineCapabilities::full())
        .build();

    let request = args.request();
    let output = engine.run(&MergeLog::new(), &MergeLog::new(), &request);
    let result = &output.result;

    println!("Roulette Selection (seed {})", request.seed);
    println!("==============================");

    if result.is_empty() {
        println!("No LoRAs selected.");
    } else {
        for (i, item) in result.items.iter().enumerate() {
            let marker = if item.applied { "✓" } else { "✗" };
            println!("  {} {:>2}. {}", marker, i + 1, item.notation());
            println!("        {}", item.file.path().display());
        }
    }

    println!();
    println!("Applied: {}/{}", result.applied_count(), result.len());
    println!("Merges:  {}", output.model.len());

    println!();
    println!("Positive:");
    println!("  {}", result.positive_text);
    println!("Negative:");
    println!("  {}", result.negative_text);

    if !output.preview.is_empty() && engine.config().preview.enabled {
        println!();
        println!(
            "Previews: {} at {}x{}",
            output.preview.len(),
            output.preview.size(),
            output.preview.size()
        );
    }

    if !output.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &output.warnings {
            println!("  - {}", warning);
        }
    }

    Ok(())
}
