//! Topology command

use roulette_lora::block_weight::{detect_topology, max_output_block, slot_histogram, UNET_MARKER};
use roulette_lora::LoraLoader;
use std::path::Path;

pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let tensors = LoraLoader::default().load_raw(path)?;
    let keys: Vec<&str> = tensors.keys().map(String::as_str).collect();

    let topology = detect_topology(keys.iter().copied());
    let unet_keys = keys.iter().filter(|k| k.contains(UNET_MARKER)).count();

    println!("LoRA: {}", path.display());
    println!("==============================");
    println!("Tensors:    {}", keys.len());
    println!("UNet keys:  {}", unet_keys);
    match max_output_block(keys.iter().copied()) {
        Some(max) => println!("Max output: {}", max),
        None => println!("Max output: -"),
    }
    println!("Topology:   {} ({} slots)", topology, topology.slot_count());

    println!();
    println!("Keys per slot:");
    for (slot, count) in slot_histogram(keys.iter().copied(), topology)
        .into_iter()
        .enumerate()
    {
        println!("  {:>2}: {}", slot, count);
    }

    Ok(())
}
