//! Selection engine
//!
//! One run walks every group of a request in order:
//!
//! ```text
//! discover → keyword filter → dedupe → seeded sample → per item:
//!     model strength → clip strength → (random preset) → trigger text → merge
//! ```
//!
//! Every group re-seeds the random source from the request seed, so a group
//! draws the same sequence no matter which groups precede it. Nothing in a
//! run is fatal: problems become warnings and the affected step is skipped.

use crate::config::EngineConfig;
use crate::host::{HostError, ModelHost};
use crate::preview::{self, PreviewBatch};
use crate::sampler::{self, seeded_rng};
use crate::strength::StrengthParser;
use rand::rngs::StdRng;
use roulette_core::{
    BlockWeightSpec, BlockWeightVector, EngineCapabilities, GroupRequest, LoraFile, Outcome,
    SelectedLora, SelectionRequest, SelectionResult, TriggerSource, Warning, WeightMode,
};
use roulette_lora::{
    apply_block_weights, block_weight, dedupe, trigger, KeywordFilter, LoraCatalog, MetadataCache,
    MetadataResolver, SharedMetadataCache,
};
use tracing::{debug, info, span, Level};

/// Everything a run hands back to the host
pub struct EngineOutput<H: ModelHost> {
    /// Model with every successful merge applied
    pub model: H::Model,
    /// Text encoder with every successful merge applied
    pub clip: H::Clip,
    /// Selected items and assembled texts
    pub result: SelectionResult,
    /// Encoded positive text, absent if encoding failed
    pub positive: Option<H::Conditioning>,
    /// Encoded negative text, absent if encoding failed
    pub negative: Option<H::Conditioning>,
    /// Preview images of the selected items
    pub preview: PreviewBatch,
    /// Everything that went wrong along the way
    pub warnings: Vec<Warning>,
}

/// Model and encoder handles threaded through a run
struct Handles<H: ModelHost> {
    model: H::Model,
    clip: H::Clip,
}

/// How each item gets its block weights
enum WeightPlan<'a> {
    Off,
    Fixed(BlockWeightVector),
    RandomPreset(&'a BlockWeightSpec),
}

impl<'a> WeightPlan<'a> {
    /// Fixed modes are resolved once, up front
    fn new(spec: &'a BlockWeightSpec, enabled: bool, warnings: &mut Vec<Warning>) -> Self {
        if !enabled {
            return Self::Off;
        }
        match spec.mode {
            WeightMode::RandomPreset => Self::RandomPreset(spec),
            _ => match block_weight::fixed_vector(spec).absorb(warnings) {
                Some(vector) => Self::Fixed(vector),
                None => Self::Off,
            },
        }
    }

    fn weights_for(&self, rng: &mut StdRng, warnings: &mut Vec<Warning>) -> Option<BlockWeightVector> {
        match self {
            Self::Off => None,
            Self::Fixed(vector) => Some(vector.clone()),
            Self::RandomPreset(spec) => block_weight::build_vector(spec, rng).absorb(warnings),
        }
    }
}

/// Seeded LoRA selection engine
pub struct SelectionEngine<H: ModelHost> {
    host: H,
    config: EngineConfig,
    capabilities: EngineCapabilities,
    catalog: LoraCatalog,
    resolver: MetadataResolver,
    strength: StrengthParser,
}

impl<H: ModelHost> SelectionEngine<H> {
    /// Create a new engine builder
    pub fn builder(host: H) -> EngineBuilder<H> {
        EngineBuilder::new(host)
    }

    /// Get the host
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Get engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get enabled capabilities
    pub fn capabilities(&self) -> EngineCapabilities {
        self.capabilities
    }

    /// Get the metadata resolver
    pub fn resolver(&self) -> &MetadataResolver {
        &self.resolver
    }

    /// Get the metadata cache handle
    pub fn cache(&self) -> &SharedMetadataCache {
        self.resolver.cache()
    }

    /// Run a selection request
    ///
    /// Never fails: with nothing to select, the handles come back unchanged
    /// and the texts hold only the additional prompts.
    pub fn run(
        &self,
        model: &H::Model,
        clip: &H::Clip,
        request: &SelectionRequest,
    ) -> EngineOutput<H> {
        let span = span!(Level::DEBUG, "selection_run", seed = request.seed);
        let _enter = span.enter();

        let mut state = Outcome::clean(Handles::<H> {
            model: model.clone(),
            clip: clip.clone(),
        });
        let plan = WeightPlan::new(
            &request.block_weight,
            self.capabilities.block_weight(),
            &mut state.warnings,
        );

        let mut items = Vec::new();
        for group in &request.groups {
            if group.is_inactive() {
                debug!(group = %group.display_label(), "Skipping inactive group");
                continue;
            }

            let pool = self.candidates(group).absorb(&mut state.warnings);
            if pool.is_empty() {
                continue;
            }

            let mut rng = seeded_rng(request.seed);
            let picked = sampler::select(&mut rng, &pool, group.count).absorb(&mut state.warnings);
            info!(
                group = %group.display_label(),
                pool = pool.len(),
                selected = picked.len(),
                "Selected LoRAs"
            );

            for file in picked {
                let item = self.process_item(
                    &mut rng,
                    file,
                    group,
                    request.trigger_source,
                    &plan,
                    &mut state,
                );
                items.push(item);
            }
        }

        let result = assemble_result(items, request);
        let positive = self.encode(&result.positive_text, "positive", &mut state);
        let negative = self.encode(&result.negative_text, "negative", &mut state);

        let preview = preview::build_batch(result.items.iter().map(|i| &i.file), &self.config.preview)
            .absorb(&mut state.warnings);

        let (handles, warnings) = state.into_parts();
        info!(
            items = result.len(),
            applied = result.applied_count(),
            warnings = warnings.len(),
            "Selection run complete"
        );

        EngineOutput {
            model: handles.model,
            clip: handles.clip,
            result,
            positive,
            negative,
            preview,
            warnings,
        }
    }

    /// Candidate pool of one group after filtering and deduplication
    pub fn candidates(&self, group: &GroupRequest) -> Outcome<Vec<LoraFile>> {
        let mut outcome = self.catalog.discover(&group.folder, group.include_subfolders);
        if outcome.value.is_empty() {
            if !outcome.has_warnings() {
                outcome.warn(Warning::NoCandidates(group.folder.clone()));
            }
            return outcome;
        }

        if self.capabilities.filtering() {
            let filter = KeywordFilter::from_spec(&group.filter);
            let files = std::mem::take(&mut outcome.value);
            outcome.value = filter
                .apply(files, &self.resolver, self.config.progress_interval)
                .absorb(&mut outcome.warnings);
            if outcome.value.is_empty() {
                return outcome;
            }
        }

        if group.unique_by_filename {
            let files = std::mem::take(&mut outcome.value);
            outcome.value = dedupe(files).absorb(&mut outcome.warnings);
        }

        outcome
    }

    /// Resolve one selected file and merge it
    ///
    /// Draw order: model strength, clip strength, random preset, trigger text.
    fn process_item(
        &self,
        rng: &mut StdRng,
        file: LoraFile,
        group: &GroupRequest,
        trigger_source: TriggerSource,
        plan: &WeightPlan<'_>,
        state: &mut Outcome<Handles<H>>,
    ) -> SelectedLora {
        let warnings = &mut state.warnings;
        let model_strength = self.strength.parse(&group.model_strength, rng).absorb(warnings);
        let clip_strength = self.strength.parse(&group.clip_strength, rng).absorb(warnings);
        let block_weights = plan.weights_for(rng, warnings);

        let record = trigger::record_for(&self.resolver, &file, trigger_source).absorb(warnings);
        let text = trigger::assemble(record.as_ref(), trigger_source, rng);

        let merged = self.merge(
            &state.value,
            &file,
            model_strength,
            clip_strength,
            block_weights.as_ref(),
        );
        let applied = match merged {
            Ok(handles) => {
                state.value = handles.absorb(&mut state.warnings);
                info!(
                    lora = %file.name(),
                    model_strength,
                    clip_strength,
                    "Applied LoRA"
                );
                true
            }
            Err(e) => {
                state.warn(Warning::MergeFailed {
                    path: file.path().to_path_buf(),
                    reason: e.to_string(),
                });
                false
            }
        };

        SelectedLora {
            file,
            group: group.label.clone(),
            model_strength,
            clip_strength,
            trigger: text.positive,
            negative: text.negative,
            block_weights,
            applied,
        }
    }

    /// Load and merge one file into new handles
    fn merge(
        &self,
        handles: &Handles<H>,
        file: &LoraFile,
        model_strength: f64,
        clip_strength: f64,
        block_weights: Option<&BlockWeightVector>,
    ) -> Result<Outcome<Handles<H>>, HostError> {
        let tensors = self.host.load_raw(file)?;

        let (tensors, model_strength, warnings) = match block_weights {
            // Block weights bake the model strength into the tensors
            Some(vector) => {
                let (scaled, warnings) =
                    apply_block_weights(&tensors, vector, model_strength)?.into_parts();
                (scaled, 1.0, warnings)
            }
            None => (tensors, model_strength, Vec::new()),
        };

        let (model, clip) = self.host.merge(
            &handles.model,
            &handles.clip,
            &tensors,
            model_strength,
            clip_strength,
        )?;
        Ok(Outcome {
            value: Handles { model, clip },
            warnings,
        })
    }

    fn encode(
        &self,
        text: &str,
        which: &str,
        state: &mut Outcome<Handles<H>>,
    ) -> Option<H::Conditioning> {
        match self.host.encode(&state.value.clip, &trigger::clean_prompt(text)) {
            Ok(conditioning) => Some(conditioning),
            Err(e) => {
                state.warn(Warning::EncodeFailed {
                    which: which.to_string(),
                    reason: e.to_string(),
                });
                None
            }
        }
    }
}

/// Join the items and additional prompts into the final texts
fn assemble_result(items: Vec<SelectedLora>, request: &SelectionRequest) -> SelectionResult {
    let join = |parts: Vec<String>| {
        parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut positive = vec![request.additional_positive.trim().to_string()];
    positive.extend(items.iter().map(|item| item.prompt_fragment()));

    let mut negative = vec![request.additional_negative.trim().to_string()];
    negative.extend(items.iter().map(|item| item.negative.clone()));

    SelectionResult {
        positive_text: join(positive),
        negative_text: join(negative),
        items,
    }
}

/// Engine builder
pub struct EngineBuilder<H: ModelHost> {
    host: H,
    config: EngineConfig,
    capabilities: EngineCapabilities,
    cache: Option<SharedMetadataCache>,
}

impl<H: ModelHost> EngineBuilder<H> {
    /// Create a new builder
    pub fn new(host: H) -> Self {
        Self {
            host,
            config: EngineConfig::default(),
            capabilities: EngineCapabilities::default(),
            cache: None,
        }
    }

    /// Set configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set enabled capabilities
    pub fn capabilities(mut self, capabilities: EngineCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Share a metadata cache with other engines
    pub fn cache(mut self, cache: SharedMetadataCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the engine
    ///
    /// Without an explicit cache the engine gets its own, sized by the config.
    pub fn build(self) -> SelectionEngine<H> {
        let cache = self
            .cache
            .unwrap_or_else(|| MetadataCache::shared(self.config.cache.clone()));

        info!(
            capabilities = ?self.capabilities,
            extensions = ?self.config.extensions,
            "Building selection engine"
        );

        SelectionEngine {
            host: self.host,
            catalog: LoraCatalog::new(&self.config.extensions),
            resolver: MetadataResolver::new(cache),
            strength: StrengthParser::new(self.config.strength.bound),
            capabilities: self.capabilities,
            config: self.config,
        }
    }
}
