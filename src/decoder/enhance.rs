//! Deterministic clean-up applied before the second decode attempt.
//!
//! grayscale → min-max normalize → opening → closing → Gaussian adaptive threshold

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::stretch_contrast;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{Mask, grayscale_close, grayscale_open};

use crate::config::EnhanceConfig;

pub fn enhance(region: &DynamicImage, config: &EnhanceConfig) -> GrayImage {
    let gray = region.to_luma8();
    let normalized = normalize_range(&gray);
    let opened = open(&normalized, config.morph_radius);
    let cleaned = close(&opened, config.morph_radius);
    adaptive_threshold(&cleaned, config.block_size, config.bias)
}

/// Stretch the intensity range linearly onto 0..=255.
pub fn normalize_range(gray: &GrayImage) -> GrayImage {
    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    if max <= min {
        return gray.clone();
    }
    stretch_contrast(gray, min, max, 0, 255)
}

/// Grayscale opening with a square element: removes small bright specks.
pub fn open(gray: &GrayImage, radius: u32) -> GrayImage {
    match square(radius) {
        Some(mask) => grayscale_open(gray, &mask),
        None => gray.clone(),
    }
}

/// Grayscale closing with a square element: removes small dark specks.
pub fn close(gray: &GrayImage, radius: u32) -> GrayImage {
    match square(radius) {
        Some(mask) => grayscale_close(gray, &mask),
        None => gray.clone(),
    }
}

fn square(radius: u32) -> Option<Mask> {
    match radius {
        0 => None,
        r => Some(Mask::square(u8::try_from(r).unwrap_or(u8::MAX))),
    }
}

/// Gaussian-weighted local threshold.
///
/// A pixel turns white when it is brighter than its neighbourhood's weighted
/// mean minus `bias`, black otherwise. The Gaussian width follows the usual
/// block-size rule `σ = 0.3·((block − 1)/2 − 1) + 0.8`.
pub fn adaptive_threshold(gray: &GrayImage, block_size: u32, bias: i32) -> GrayImage {
    let sigma = 0.3 * ((block_size.max(3) as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let local_mean = gaussian_blur_f32(gray, sigma);

    let mut out = GrayImage::new(gray.width(), gray.height());
    for ((dst, src), mean) in out.pixels_mut().zip(gray.pixels()).zip(local_mean.pixels()) {
        let white = src[0] as i32 > mean[0] as i32 - bias;
        dst[0] = if white { 255 } else { 0 };
    }
    out
}
