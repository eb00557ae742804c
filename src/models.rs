use image::RgbImage;
use std::sync::Arc;

use crate::error::{Result, ScanError};

/// Device rotation relative to the sensor, always one of 0/90/180/270.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rotation(u16);

impl Rotation {
    pub const NONE: Rotation = Rotation(0);

    /// Normalize any multiple of 90 degrees (negative values included).
    pub fn from_degrees(degrees: i32) -> Result<Self> {
        if degrees % 90 != 0 {
            return Err(ScanError::UnsupportedRotation(degrees));
        }
        Ok(Rotation(degrees.rem_euclid(360) as u16))
    }

    pub fn degrees(self) -> u16 {
        self.0
    }

    /// Quarter turns swap the frame's width and height.
    pub fn is_transposed(self) -> bool {
        self.0 % 180 == 90
    }
}

/// One captured camera frame. The pixels are shared, never mutated.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
    rotation: Rotation,
    sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, rotation: Rotation) -> Result<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ScanError::DegenerateFrame { width, height });
        }
        Ok(Self {
            image: Arc::new(image),
            rotation,
            sequence: 0,
        })
    }

    /// Build a frame from a packed RGB buffer as delivered by the acquirer.
    pub fn from_rgb(buffer: Vec<u8>, width: u32, height: u32, rotation_degrees: i32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ScanError::DegenerateFrame { width, height });
        }
        let expected = width as usize * height as usize * 3;
        if buffer.len() != expected {
            return Err(ScanError::BufferSize {
                expected,
                actual: buffer.len(),
            });
        }
        let rotation = Rotation::from_degrees(rotation_degrees)?;
        let image = RgbImage::from_raw(width, height, buffer).ok_or(ScanError::BufferSize {
            expected,
            actual: 0,
        })?;
        Self::new(image, rotation)
    }

    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Sequence number assigned at intake; 0 until the frame is submitted.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Axis-aligned rectangle, edges in floating point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn is_finite(&self) -> bool {
        self.left.is_finite() && self.top.is_finite() && self.right.is_finite() && self.bottom.is_finite()
    }

    /// Clamp every edge into `lo..=hi`. NaN edges stay NaN.
    pub fn clamp(&self, lo: f32, hi: f32) -> Rect {
        Rect::new(
            self.left.clamp(lo, hi),
            self.top.clamp(lo, hi),
            self.right.clamp(lo, hi),
            self.bottom.clamp(lo, hi),
        )
    }

    pub fn scale(&self, factor: f32) -> Rect {
        Rect::new(
            self.left * factor,
            self.top * factor,
            self.right * factor,
            self.bottom * factor,
        )
    }
}

/// A rectangle in sensor (full-resolution frame) pixel coordinates.
pub type SensorBox = Rect;

/// Raw classifier output. Coordinates are normalized to the model square.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionBox {
    pub rect: Rect,
    pub class_index: usize,
    pub score: f32,
}

impl DetectionBox {
    /// Box in model-space pixels for a square of `input_size`.
    ///
    /// Coordinates outside the unit square are pulled back onto its edges.
    pub fn model_rect(&self, input_size: u32) -> Rect {
        self.rect.clamp(0.0, 1.0).scale(input_size as f32)
    }
}

/// A decoded code. Two recognitions with the same `id` are the same entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    /// Decoded text, also the dedup key
    pub id: String,
    pub label: String,
    pub confidence: f32,
    pub location: SensorBox,
}

/// Bounding box and pixel count of one connected component
#[derive(Debug, Clone)]
pub struct Contour {
    pub label: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub pixel_count: u32,
}

impl Contour {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width() as f32 / self.height() as f32
    }

    /// Share of the bounding box covered by the component's pixels.
    pub fn fill_ratio(&self) -> f32 {
        self.pixel_count as f32 / (self.width() * self.height()) as f32
    }
}
