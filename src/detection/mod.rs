//! A model-free [`Classifier`]: proposes regions dense with edges, which is
//! what printed 2D codes look like at any scale.

pub mod contours;
pub mod preprocessing;

use anyhow::ensure;
use image::RgbImage;

use crate::classifier::Classifier;
use crate::models::{Contour, DetectionBox, Rect};
use preprocessing::EdgeParams;

pub struct ContourClassifier {
    input_size: u32,
    pub edges: EdgeParams,
    /// Smallest side, as a share of the input square
    pub min_side: f32,
    /// Widest accepted width/height ratio (and its inverse)
    pub max_aspect: f32,
    pub max_detections: usize,
}

impl ContourClassifier {
    pub fn new(input_size: u32) -> Self {
        Self {
            input_size,
            edges: EdgeParams::default(),
            min_side: 0.06,
            max_aspect: 1.6,
            max_detections: 10,
        }
    }

    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = max_detections;
        self
    }

    fn is_code_shaped(&self, blob: &Contour) -> bool {
        let min_side = (self.input_size as f32 * self.min_side).max(1.0);
        let aspect = blob.aspect_ratio();
        blob.width() as f32 >= min_side
            && blob.height() as f32 >= min_side
            && aspect <= self.max_aspect
            && aspect >= 1.0 / self.max_aspect
    }

    fn to_detection(&self, blob: &Contour) -> DetectionBox {
        let size = self.input_size as f32;
        DetectionBox {
            rect: Rect::new(
                blob.min_x as f32 / size,
                blob.min_y as f32 / size,
                (blob.max_x + 1) as f32 / size,
                (blob.max_y + 1) as f32 / size,
            ),
            class_index: 0,
            // An outline alone covers little of its box; module grids cover most of it.
            score: blob.fill_ratio().clamp(0.0, 1.0),
        }
    }
}

impl Classifier for ContourClassifier {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn classify(&self, input: &RgbImage) -> anyhow::Result<Vec<DetectionBox>> {
        ensure!(
            input.dimensions() == (self.input_size, self.input_size),
            "expected a {0}x{0} input, got {1}x{2}",
            self.input_size,
            input.width(),
            input.height()
        );

        let edges = preprocessing::edge_map(input, &self.edges);
        let min_pixels = (self.input_size * self.input_size / 400).max(4);
        let mut detections: Vec<DetectionBox> = contours::find_contours(&edges, min_pixels)
            .iter()
            .filter(|blob| self.is_code_shaped(blob))
            .map(|blob| self.to_detection(blob))
            .collect();

        detections.sort_by(|a, b| b.score.total_cmp(&a.score));
        detections.truncate(self.max_detections);
        tracing::trace!(count = detections.len(), "contour proposals");
        Ok(detections)
    }
}
