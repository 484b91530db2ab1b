//! Preview image batches
//!
//! Each selected LoRA may have a preview image next to it whose file name
//! starts with the LoRA's name. Previews are scaled so their long side fills
//! a square, padded centred on black, and stacked into one batch.

use candle_core::{Device, Tensor};
use image::imageops::{self, FilterType};
use image::RgbImage;
use roulette_core::{LoraFile, Outcome, Warning};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Image extensions tried first
pub const STATIC_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Image extensions tried when no static preview exists; first frame only
pub const ANIMATED_EXTENSIONS: &[&str] = &["gif", "webp"];

/// Preview configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Look for previews at all
    pub enabled: bool,
    /// Edge length of the square in pixels
    pub size: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size: 1240,
        }
    }
}

/// Stack of square RGB previews
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewBatch {
    size: u32,
    images: Vec<RgbImage>,
}

impl PreviewBatch {
    /// A batch holding one black square
    pub fn blank(size: u32) -> Self {
        let size = size.max(1);
        Self {
            size,
            images: vec![RgbImage::new(size, size)],
        }
    }

    /// Edge length of every image
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Images in selection order
    pub fn images(&self) -> &[RgbImage] {
        &self.images
    }

    /// Number of images
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Check if the batch has no images
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// `(batch, height, width, 3)` float tensor with values in `0.0..=1.0`
    pub fn to_tensor(&self, device: &Device) -> candle_core::Result<Tensor> {
        let edge = self.size as usize;
        let data: Vec<f32> = self
            .images
            .iter()
            .flat_map(|img| img.as_raw().iter().map(|&v| v as f32 / 255.0))
            .collect();
        Tensor::from_vec(data, (self.images.len(), edge, edge, 3), device)
    }
}

/// First preview image for a LoRA, static formats before animated ones
pub fn find_preview(file: &LoraFile) -> Option<PathBuf> {
    let prefix = file.name().to_lowercase();
    let mut candidates: Vec<(String, PathBuf)> = std::fs::read_dir(file.dir())
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().to_lowercase();
            name.starts_with(&prefix).then_some((name, path))
        })
        .collect();
    candidates.sort();

    [STATIC_EXTENSIONS, ANIMATED_EXTENSIONS]
        .iter()
        .find_map(|extensions| {
            candidates
                .iter()
                .find(|(name, _)| {
                    name.rsplit_once('.')
                        .is_some_and(|(_, ext)| extensions.contains(&ext))
                })
                .map(|(_, path)| path.clone())
        })
}

/// Load an image scaled to fit and padded onto a black `size` square
pub fn load_square(path: &Path, size: u32) -> Result<RgbImage, image::ImageError> {
    let size = size.max(1);
    let img = image::open(path)?.to_rgb8();
    let (width, height) = img.dimensions();
    let long = width.max(height).max(1) as f64;

    let scaled_w = ((width as f64 * size as f64 / long).round() as u32).clamp(1, size);
    let scaled_h = ((height as f64 * size as f64 / long).round() as u32).clamp(1, size);
    let resized = imageops::resize(&img, scaled_w, scaled_h, FilterType::Lanczos3);

    let mut canvas = RgbImage::new(size, size);
    let x = (size - scaled_w) / 2;
    let y = (size - scaled_h) / 2;
    imageops::overlay(&mut canvas, &resized, x as i64, y as i64);
    Ok(canvas)
}

/// Build the preview batch for the selected files
///
/// Files without a preview are skipped; if none has one, the batch is a
/// single black square.
pub fn build_batch<'a>(
    files: impl IntoIterator<Item = &'a LoraFile>,
    config: &PreviewConfig,
) -> Outcome<PreviewBatch> {
    let size = config.size.max(1);
    if !config.enabled {
        return Outcome::clean(PreviewBatch::blank(size));
    }

    let mut outcome = Outcome::clean(Vec::new());
    for file in files {
        let Some(path) = find_preview(file) else {
            continue;
        };
        match load_square(&path, size) {
            Ok(image) => {
                debug!(path = %path.display(), "Loaded preview");
                outcome.value.push(image);
            }
            Err(e) => outcome.warn(Warning::PreviewFailed {
                path,
                reason: e.to_string(),
            }),
        }
    }

    outcome.map(|images| {
        if images.is_empty() {
            PreviewBatch::blank(size)
        } else {
            PreviewBatch { size, images }
        }
    })
}
