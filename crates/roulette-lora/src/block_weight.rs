//! Per-block LoRA weighting
//!
//! A block-weight vector holds one multiplier per UNet layer group. SD1.5
//! LoRAs use 17 slots and SDXL LoRAs 20:
//!
//! | Slot | SD1.5 | SDXL |
//! |------|-------|------|
//! | 0 | base (time/label embedding) | base |
//! | 1..=6 / 1..=9 | input blocks 1, 2, 4, 5, 7, 8 | input blocks 0..=8 |
//! | 7 / 10 | middle block | middle block |
//! | 8..=16 / 11..=19 | output blocks 3..=11 | output blocks 0..=8 |
//!
//! The topology is read from the tensor keys of the file being weighted, so a
//! vector written for one topology is truncated or padded with 1.0 to fit
//! the other.

use candle_core::Tensor;
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use roulette_core::{BlockPreset, BlockWeightSpec, BlockWeightVector, Outcome, WeightMode, Warning};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// Tensors of one LoRA file by key
pub type TensorMap = HashMap<String, Tensor>;

/// Key marker of UNet tensors
pub const UNET_MARKER: &str = "lora_unet";

static INPUT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"input_blocks_(\d+)").expect("input block pattern is valid"));
static OUTPUT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"output_blocks_(\d+)").expect("output block pattern is valid"));

/// UNet layouts with a known block-weight slot count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnetTopology {
    /// 12 output blocks, 17 slots
    Sd15,
    /// 9 output blocks, 20 slots
    Sdxl,
}

impl UnetTopology {
    /// Number of block-weight slots
    pub fn slot_count(&self) -> usize {
        match self {
            Self::Sd15 => 17,
            Self::Sdxl => 20,
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Sd15 => "SD1.5",
            Self::Sdxl => "SDXL",
        }
    }
}

impl fmt::Display for UnetTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A named rule recognising one topology from tensor keys
pub struct TopologyFingerprint {
    /// Topology reported on a match
    pub topology: UnetTopology,
    /// Rule description
    pub rule: &'static str,
    /// Predicate over the key set
    pub matches: fn(&[&str]) -> bool,
}

/// Fingerprints in evaluation order; the last always matches
pub const FINGERPRINTS: [TopologyFingerprint; 2] = [
    TopologyFingerprint {
        topology: UnetTopology::Sd15,
        rule: "output block index 9 or higher",
        matches: has_deep_output_blocks,
    },
    TopologyFingerprint {
        topology: UnetTopology::Sdxl,
        rule: "fallback",
        matches: always,
    },
];

fn has_deep_output_blocks(keys: &[&str]) -> bool {
    max_output_block(keys.iter().copied()).is_some_and(|n| n >= 9)
}

fn always(_: &[&str]) -> bool {
    true
}

/// Highest output block index among the keys
pub fn max_output_block<'a>(keys: impl IntoIterator<Item = &'a str>) -> Option<u32> {
    keys.into_iter()
        .filter_map(|key| capture_index(&OUTPUT_BLOCK, key))
        .max()
}

/// Classify a tensor key set
pub fn detect_topology<'a>(keys: impl IntoIterator<Item = &'a str>) -> UnetTopology {
    let keys: Vec<&str> = keys.into_iter().collect();
    FINGERPRINTS
        .iter()
        .find(|fingerprint| (fingerprint.matches)(&keys))
        .map(|fingerprint| fingerprint.topology)
        .unwrap_or(UnetTopology::Sdxl)
}

/// Slot a tensor key is weighted by
///
/// Keys that match no block pattern fall back to slot 0.
pub fn block_index(key: &str, topology: UnetTopology) -> usize {
    if key.contains("time_embed") || key.contains("label_emb") {
        return 0;
    }

    let slot = match topology {
        UnetTopology::Sd15 => {
            if let Some(n) = capture_index(&INPUT_BLOCK, key) {
                match n {
                    1 => Some(1),
                    2 => Some(2),
                    4 => Some(3),
                    5 => Some(4),
                    7 => Some(5),
                    8 => Some(6),
                    _ => None,
                }
            } else if key.contains("middle_block") {
                Some(7)
            } else {
                capture_index(&OUTPUT_BLOCK, key)
                    .filter(|n| (3..=11).contains(n))
                    .map(|n| 8 + (n as usize - 3))
            }
        }
        UnetTopology::Sdxl => {
            if let Some(n) = capture_index(&INPUT_BLOCK, key) {
                (n <= 8).then(|| 1 + n as usize)
            } else if key.contains("middle_block") {
                Some(10)
            } else {
                capture_index(&OUTPUT_BLOCK, key)
                    .filter(|n| *n <= 8)
                    .map(|n| 11 + n as usize)
            }
        }
    };

    slot.unwrap_or(0)
}

fn capture_index(pattern: &Regex, key: &str) -> Option<u32> {
    pattern
        .captures(key)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Weights of a named preset, laid out for SDXL
pub fn preset_weights(preset: BlockPreset) -> BlockWeightVector {
    let weights: [f64; 20] = match preset {
        BlockPreset::StyleFocused => [
            1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0,
            1.0, 1.0, 1.0,
        ],
        BlockPreset::CharacterFocused => [
            1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0,
            1.0, 1.0, 1.0,
        ],
        BlockPreset::StructureOnly => [
            1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0,
        ],
        BlockPreset::BalancedSoft => [
            1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0,
            0.0, 0.0, 0.0,
        ],
    };
    BlockWeightVector::new(weights.to_vec())
}

/// Parse a comma-separated weight list
pub fn parse_weights(input: &str) -> Result<Vec<f64>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("no weights given".to_string());
    }
    input
        .split(',')
        .map(|w| {
            let w = w.trim();
            w.parse::<f64>()
                .map_err(|_| format!("'{}' is not a number", w))
        })
        .collect()
}

/// Build the vector for a weighting spec
///
/// `Normal` and unparsable direct input give `None`, meaning no block
/// weighting. `RandomPreset` makes one draw from `rng`.
pub fn build_vector<R: Rng + ?Sized>(
    spec: &BlockWeightSpec,
    rng: &mut R,
) -> Outcome<Option<BlockWeightVector>> {
    match spec.mode {
        WeightMode::RandomPreset => {
            let preset = BlockPreset::ALL
                .choose(rng)
                .copied()
                .unwrap_or(BlockPreset::BalancedSoft);
            info!(preset = %preset, "Picked random block-weight preset");
            Outcome::clean(Some(preset_weights(preset)))
        }
        _ => fixed_vector(spec),
    }
}

/// Vector for the modes that need no random source
///
/// `RandomPreset` gives `None` here; use [`build_vector`] for it.
pub fn fixed_vector(spec: &BlockWeightSpec) -> Outcome<Option<BlockWeightVector>> {
    match spec.mode {
        WeightMode::Normal | WeightMode::RandomPreset => Outcome::clean(None),
        WeightMode::Preset(preset) => Outcome::clean(Some(preset_weights(preset))),
        WeightMode::Direct => match parse_weights(&spec.input) {
            Ok(weights) => Outcome::clean(Some(BlockWeightVector::new(weights))),
            Err(reason) => Outcome::warned(
                None,
                Warning::InvalidBlockWeights {
                    input: spec.input.clone(),
                    reason,
                },
            ),
        },
    }
}

/// Truncate or pad with 1.0 to the slot count of `topology`
pub fn fit_vector(vector: &BlockWeightVector, topology: UnetTopology) -> Outcome<BlockWeightVector> {
    let expected = topology.slot_count();
    if vector.len() == expected {
        return Outcome::clean(vector.clone());
    }

    let mut weights = vector.as_slice().to_vec();
    weights.resize(expected, 1.0);
    Outcome::warned(
        BlockWeightVector::new(weights),
        Warning::BlockWeightsAdjusted {
            topology: topology.to_string(),
            supplied: vector.len(),
            expected,
        },
    )
}

/// Number of UNet keys mapped to each slot
pub fn slot_histogram<'a>(
    keys: impl IntoIterator<Item = &'a str>,
    topology: UnetTopology,
) -> Vec<usize> {
    let mut counts = vec![0; topology.slot_count()];
    for key in keys.into_iter().filter(|k| k.contains(UNET_MARKER)) {
        counts[block_index(key, topology)] += 1;
    }
    counts
}

/// Scale every tensor by `base`, and UNet tensors additionally by their slot weight
///
/// The result is meant to be merged with a model strength of 1.0.
pub fn apply_block_weights(
    tensors: &TensorMap,
    vector: &BlockWeightVector,
    base: f64,
) -> candle_core::Result<Outcome<TensorMap>> {
    let topology = detect_topology(tensors.keys().map(String::as_str));
    let (weights, warnings) = fit_vector(vector, topology).into_parts();
    let weights = weights.as_slice();

    let mut scaled = TensorMap::with_capacity(tensors.len());
    for (key, tensor) in tensors {
        let factor = if key.contains(UNET_MARKER) {
            base * weights[block_index(key, topology)]
        } else {
            base
        };
        scaled.insert(key.clone(), tensor.affine(factor, 0.0)?);
    }

    debug!(
        topology = %topology,
        tensors = tensors.len(),
        base,
        "Applied block weights"
    );
    Ok(Outcome {
        value: scaled,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SD15_KEYS: &[&str] = &[
        "lora_unet_input_blocks_1_1_proj_in.lora_down.weight",
        "lora_unet_middle_block_1_proj_out.lora_up.weight",
        "lora_unet_output_blocks_11_1_proj_in.alpha",
        "lora_te_text_model_encoder_layers_0_mlp_fc1.lora_up.weight",
    ];

    const SDXL_KEYS: &[&str] = &[
        "lora_unet_input_blocks_4_1_proj_in.lora_down.weight",
        "lora_unet_output_blocks_8_1_proj_in.lora_up.weight",
        "lora_te1_text_model_encoder_layers_0_mlp_fc1.lora_up.weight",
    ];

    #[test]
    fn test_detect_topology() {
        assert_eq!(detect_topology(SD15_KEYS.iter().copied()), UnetTopology::Sd15);
        assert_eq!(detect_topology(SDXL_KEYS.iter().copied()), UnetTopology::Sdxl);
        assert_eq!(detect_topology(["output_blocks_9_0"]), UnetTopology::Sd15);
        assert_eq!(detect_topology(std::iter::empty()), UnetTopology::Sdxl);
    }

    #[test]
    fn test_fingerprint_order() {
        assert_eq!(FINGERPRINTS[0].topology, UnetTopology::Sd15);
        assert!((FINGERPRINTS[0].matches)(&["lora_unet_output_blocks_11_0"]));
        assert!(!(FINGERPRINTS[0].matches)(&["lora_unet_output_blocks_8_0"]));
        assert!((FINGERPRINTS[1].matches)(&[]));
    }

    #[test]
    fn test_block_index_sdxl() {
        let t = UnetTopology::Sdxl;
        assert_eq!(block_index("lora_unet_input_blocks_3_1_x", t), 4);
        assert_eq!(block_index("lora_unet_input_blocks_0_0_x", t), 1);
        assert_eq!(block_index("lora_unet_middle_block_1_x", t), 10);
        assert_eq!(block_index("lora_unet_output_blocks_0_1_x", t), 11);
        assert_eq!(block_index("lora_unet_output_blocks_8_1_x", t), 19);
        assert_eq!(block_index("lora_unet_label_emb_0_0", t), 0);
        assert_eq!(block_index("lora_unet_output_blocks_9_1_x", t), 0);
        assert_eq!(block_index("lora_unet_out_2", t), 0);
    }

    #[test]
    fn test_block_index_sd15() {
        let t = UnetTopology::Sd15;
        let inputs: Vec<usize> = [1, 2, 4, 5, 7, 8]
            .iter()
            .map(|n| block_index(&format!("lora_unet_input_blocks_{}_1_x", n), t))
            .collect();
        assert_eq!(inputs, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(block_index("lora_unet_input_blocks_3_0_op", t), 0);
        assert_eq!(block_index("lora_unet_middle_block_1_x", t), 7);
        assert_eq!(block_index("lora_unet_output_blocks_3_1_x", t), 8);
        assert_eq!(block_index("lora_unet_output_blocks_11_1_x", t), 16);
        assert_eq!(block_index("lora_unet_output_blocks_2_1_x", t), 0);
        assert_eq!(block_index("lora_unet_time_embed_0", t), 0);
    }

    #[test]
    fn test_build_vector_modes() {
        let mut rng = StdRng::seed_from_u64(0);

        assert!(build_vector(&BlockWeightSpec::normal(), &mut rng).value.is_none());

        let style = build_vector(&BlockWeightSpec::preset(BlockPreset::StyleFocused), &mut rng);
        assert_eq!(style.value.unwrap().to_notation(), "1,0,0,0,0,0,0,0,0,0,0,1,1,1,1,1,1,1,1,1");

        let direct = build_vector(&BlockWeightSpec::direct("1, 0.5 ,0"), &mut rng);
        assert_eq!(direct.value.unwrap().as_slice(), &[1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_fixed_vector() {
        let style = fixed_vector(&BlockWeightSpec::preset(BlockPreset::StyleFocused));
        assert_eq!(style.value, Some(preset_weights(BlockPreset::StyleFocused)));

        let direct = fixed_vector(&BlockWeightSpec::direct("1,0"));
        assert_eq!(direct.value.unwrap().as_slice(), &[1.0, 0.0]);

        let random = BlockWeightSpec {
            mode: WeightMode::RandomPreset,
            input: String::new(),
        };
        assert!(fixed_vector(&random).value.is_none());
        assert!(fixed_vector(&BlockWeightSpec::normal()).value.is_none());
        assert!(fixed_vector(&BlockWeightSpec::direct("x")).has_warnings());
    }

    #[test]
    fn test_build_vector_invalid_direct() {
        let mut rng = StdRng::seed_from_u64(0);
        for input in ["", "  ", "1,abc,0"] {
            let outcome = build_vector(&BlockWeightSpec::direct(input), &mut rng);
            assert!(outcome.value.is_none());
            assert!(matches!(
                outcome.warnings[0],
                Warning::InvalidBlockWeights { .. }
            ));
        }
    }

    #[test]
    fn test_random_preset() {
        let spec = BlockWeightSpec {
            mode: WeightMode::RandomPreset,
            input: String::new(),
        };
        let presets: Vec<BlockWeightVector> =
            BlockPreset::ALL.iter().map(|p| preset_weights(*p)).collect();

        for seed in 0..10 {
            let mut a = StdRng::seed_from_u64(seed);
            let mut b = StdRng::seed_from_u64(seed);
            let first = build_vector(&spec, &mut a).value.unwrap();
            assert!(presets.contains(&first));
            assert_eq!(first, build_vector(&spec, &mut b).value.unwrap());
        }
    }

    #[test]
    fn test_fit_vector() {
        let sdxl = preset_weights(BlockPreset::StructureOnly);

        let same = fit_vector(&sdxl, UnetTopology::Sdxl);
        assert_eq!(same.value, sdxl);
        assert!(!same.has_warnings());

        let truncated = fit_vector(&sdxl, UnetTopology::Sd15);
        assert_eq!(truncated.value.len(), 17);
        assert_eq!(truncated.value.as_slice(), &sdxl.as_slice()[..17]);
        assert_eq!(
            truncated.warnings,
            vec![Warning::BlockWeightsAdjusted {
                topology: "SD1.5".to_string(),
                supplied: 20,
                expected: 17,
            }]
        );

        let padded = fit_vector(&BlockWeightVector::new(vec![0.5; 3]), UnetTopology::Sd15);
        assert_eq!(padded.value.len(), 17);
        assert_eq!(padded.value.as_slice()[2], 0.5);
        assert_eq!(padded.value.as_slice()[3], 1.0);
    }

    #[test]
    fn test_slot_histogram() {
        let counts = slot_histogram(SDXL_KEYS.iter().copied(), UnetTopology::Sdxl);
        assert_eq!(counts.len(), 20);
        assert_eq!(counts[5], 1);
        assert_eq!(counts[19], 1);
        assert_eq!(counts.iter().sum::<usize>(), 2);
    }

    #[test]
    fn test_apply_block_weights() {
        let device = Device::Cpu;
        let mut tensors = TensorMap::new();
        for key in SDXL_KEYS {
            tensors.insert(
                key.to_string(),
                Tensor::new(&[1.0f32, 2.0], &device).unwrap(),
            );
        }

        let mut weights = vec![1.0; 20];
        weights[5] = 0.0;
        weights[19] = 0.5;
        let vector = BlockWeightVector::new(weights);

        let outcome = apply_block_weights(&tensors, &vector, 0.8).unwrap();
        assert!(!outcome.has_warnings());

        let values = |key: &str| outcome.value[key].to_vec1::<f32>().unwrap();
        assert_eq!(values(SDXL_KEYS[0]), vec![0.0, 0.0]);
        assert_eq!(values(SDXL_KEYS[1]), vec![0.4, 0.8]);
        assert_eq!(values(SDXL_KEYS[2]), vec![0.8, 1.6]);
    }

    #[test]
    fn test_apply_adjusts_length() {
        let device = Device::Cpu;
        let mut tensors = TensorMap::new();
        for key in SD15_KEYS {
            tensors.insert(key.to_string(), Tensor::new(&[1.0f32], &device).unwrap());
        }

        let outcome =
            apply_block_weights(&tensors, &preset_weights(BlockPreset::StyleFocused), 1.0).unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.value.len(), SD15_KEYS.len());
    }
}
