//! The object-detection model seam and the glue around it.

use image::RgbImage;
use image::imageops::{self, FilterType};
use std::path::Path;

use crate::models::{DetectionBox, Frame};
use crate::transform::TransformPair;

/// An object-detection model that proposes code locations.
///
/// Boxes are returned in coordinates normalized to the model square
/// (`0.0..=1.0` on both axes).
pub trait Classifier: Send + Sync {
    /// Side length of the square RGB image [`classify`](Self::classify) expects.
    fn input_size(&self) -> u32;

    fn classify(&self, input: &RgbImage) -> anyhow::Result<Vec<DetectionBox>>;
}

/// Class index → label.
///
/// Line 0 of a label file is the background class, which the model never
/// reports, so class `i` reads line `i + 1`.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    labels: Vec<String>,
}

const UNKNOWN_LABEL: &str = "???";
const LABEL_OFFSET: usize = 1;

impl LabelMap {
    pub fn from_text(text: &str) -> Self {
        Self {
            labels: text.lines().map(|line| line.trim().to_string()).collect(),
        }
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        Ok(Self::from_text(&std::fs::read_to_string(path)?))
    }

    pub fn label(&self, class_index: usize) -> &str {
        self.labels
            .get(class_index + LABEL_OFFSET)
            .map(String::as_str)
            .filter(|label| !label.is_empty())
            .unwrap_or(UNKNOWN_LABEL)
    }
}

/// Tensor encodings a detection runtime may want.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    /// Interleaved RGB bytes as-is
    Quantized(Vec<u8>),
    /// Interleaved RGB, each channel mapped to `(v - 128) / 128`
    Float(Vec<f32>),
}

/// The frame as the classifier sees it: turned upright and stretched onto the
/// model square, matching the forward matrix of the session's [`TransformPair`].
#[derive(Debug, Clone)]
pub struct ModelInput {
    image: RgbImage,
}

const IMAGE_MEAN: f32 = 128.0;
const IMAGE_STD: f32 = 128.0;

impl ModelInput {
    pub fn prepare(frame: &Frame, pair: &TransformPair) -> Self {
        let upright = match pair.rotation.degrees() {
            90 => imageops::rotate90(frame.image()),
            180 => imageops::rotate180(frame.image()),
            270 => imageops::rotate270(frame.image()),
            _ => frame.image().clone(),
        };
        let size = pair.target_size;
        let image = if upright.dimensions() == (size, size) {
            upright
        } else {
            imageops::resize(&upright, size, size, FilterType::Triangle)
        };
        Self { image }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn to_tensor(&self, quantized: bool) -> TensorData {
        let raw = self.image.as_raw();
        if quantized {
            TensorData::Quantized(raw.clone())
        } else {
            TensorData::Float(raw.iter().map(|&v| (v as f32 - IMAGE_MEAN) / IMAGE_STD).collect())
        }
    }
}
