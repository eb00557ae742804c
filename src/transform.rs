//! Sensor space ↔ model space geometry.
//!
//! The classifier sees the frame rotated upright and stretched into a
//! `target × target` square. [`TransformPair`] holds the affine matrix for that
//! mapping and its exact inverse, which maps classifier boxes back onto the
//! full-resolution frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Result, ScanError};
use crate::models::{Rect, Rotation};

/// 2×3 affine matrix: `x' = a·x + b·y + c`, `y' = d·x + e·y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 0.0,
        e: 1.0,
        f: 0.0,
    };

    pub fn translation(tx: f32, ty: f32) -> Self {
        Affine {
            c: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    pub fn scaling(sx: f32, sy: f32) -> Self {
        Affine {
            a: sx,
            e: sy,
            ..Self::IDENTITY
        }
    }

    /// Clockwise on screen (y grows downwards).
    pub fn rotation(rotation: Rotation) -> Self {
        // Quarter turns only, so use exact values instead of sin/cos.
        let (cos, sin) = match rotation.degrees() {
            90 => (0.0, 1.0),
            180 => (-1.0, 0.0),
            270 => (0.0, -1.0),
            _ => (1.0, 0.0),
        };
        Affine {
            a: cos,
            b: -sin,
            c: 0.0,
            d: sin,
            e: cos,
            f: 0.0,
        }
    }

    /// Apply `self` first, then `next`.
    pub fn then(&self, next: &Affine) -> Affine {
        Affine {
            a: next.a * self.a + next.b * self.d,
            b: next.a * self.b + next.b * self.e,
            c: next.a * self.c + next.b * self.f + next.c,
            d: next.d * self.a + next.e * self.d,
            e: next.d * self.b + next.e * self.e,
            f: next.d * self.c + next.e * self.f + next.f,
        }
    }

    pub fn determinant(&self) -> f32 {
        self.a * self.e - self.b * self.d
    }

    pub fn invert(&self) -> Option<Affine> {
        let det = self.determinant();
        if det.abs() < f32::EPSILON {
            return None;
        }
        Some(Affine {
            a: self.e / det,
            b: -self.b / det,
            c: (self.b * self.f - self.c * self.e) / det,
            d: -self.d / det,
            e: self.a / det,
            f: (self.c * self.d - self.a * self.f) / det,
        })
    }

    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.b * y + self.c,
            self.d * x + self.e * y + self.f,
        )
    }

    /// Map all four corners and return their bounding rectangle.
    pub fn map_rect(&self, rect: &Rect) -> Rect {
        let corners = [
            self.map_point(rect.left, rect.top),
            self.map_point(rect.right, rect.top),
            self.map_point(rect.right, rect.bottom),
            self.map_point(rect.left, rect.bottom),
        ];
        let mut out = Rect::new(f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
        for (x, y) in corners {
            out.left = out.left.min(x);
            out.top = out.top.min(y);
            out.right = out.right.max(x);
            out.bottom = out.bottom.max(y);
        }
        out
    }
}

/// Frame → model square (`forward`) and back (`inverse`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformPair {
    pub forward: Affine,
    pub inverse: Affine,
    pub frame_width: u32,
    pub frame_height: u32,
    pub target_size: u32,
    pub rotation: Rotation,
}

impl TransformPair {
    pub fn compute(frame_width: u32, frame_height: u32, target_size: u32, rotation: Rotation) -> Result<Self> {
        if frame_width == 0 || frame_height == 0 || target_size == 0 {
            return Err(ScanError::DegenerateFrame {
                width: frame_width,
                height: frame_height,
            });
        }

        let (in_width, in_height) = if rotation.is_transposed() {
            (frame_height as f32, frame_width as f32)
        } else {
            (frame_width as f32, frame_height as f32)
        };
        let target = target_size as f32;

        let forward = Affine::translation(-(frame_width as f32) / 2.0, -(frame_height as f32) / 2.0)
            .then(&Affine::rotation(rotation))
            .then(&Affine::scaling(target / in_width, target / in_height))
            .then(&Affine::translation(target / 2.0, target / 2.0));

        // Non-zero scale factors and a rotation always leave an invertible matrix.
        let inverse = forward.invert().ok_or(ScanError::DegenerateFrame {
            width: frame_width,
            height: frame_height,
        })?;

        Ok(Self {
            forward,
            inverse,
            frame_width,
            frame_height,
            target_size,
            rotation,
        })
    }

    pub fn to_model(&self, sensor: &Rect) -> Rect {
        self.forward.map_rect(sensor)
    }

    pub fn to_sensor(&self, model: &Rect) -> Rect {
        self.inverse.map_rect(model)
    }

    fn matches(&self, frame_width: u32, frame_height: u32, rotation: Rotation) -> bool {
        self.frame_width == frame_width && self.frame_height == frame_height && self.rotation == rotation
    }
}

/// Holds the transform for the current camera session.
///
/// The pair is recomputed only when the frame size or rotation changes and is
/// handed out as a shared read-only `Arc`, so workers never observe a pair that
/// is being rebuilt.
#[derive(Debug)]
pub struct SessionGeometry {
    target_size: u32,
    current: RwLock<Option<Arc<TransformPair>>>,
    recomputed: AtomicU64,
}

impl SessionGeometry {
    pub fn new(target_size: u32) -> Self {
        Self {
            target_size,
            current: RwLock::new(None),
            recomputed: AtomicU64::new(0),
        }
    }

    pub fn transform_for(&self, frame_width: u32, frame_height: u32, rotation: Rotation) -> Result<Arc<TransformPair>> {
        {
            let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(pair) = current.as_ref() {
                if pair.matches(frame_width, frame_height, rotation) {
                    return Ok(pair.clone());
                }
            }
        }

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(pair) = current.as_ref() {
            if pair.matches(frame_width, frame_height, rotation) {
                return Ok(pair.clone());
            }
        }
        let pair = Arc::new(TransformPair::compute(
            frame_width,
            frame_height,
            self.target_size,
            rotation,
        )?);
        tracing::debug!(
            frame_width,
            frame_height,
            rotation = rotation.degrees(),
            target = self.target_size,
            "recomputed frame transform"
        );
        *current = Some(pair.clone());
        self.recomputed.fetch_add(1, Ordering::Relaxed);
        Ok(pair)
    }

    /// How many times a new pair had to be computed this session.
    pub fn recompute_count(&self) -> u64 {
        self.recomputed.load(Ordering::Relaxed)
    }
}
