use image::{Rgb, RgbImage};

use crate::models::{Frame, SensorBox};

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Placement of a padded crop in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionBounds {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// Work out where the padded crop for `sensor_box` sits in the frame.
///
/// The size is the padded box clamped to the frame's own dimensions. If the
/// padded box fits, it keeps its position and whatever hangs over the frame
/// edge becomes blank margin. If it had to be shrunk, it is pushed back inside
/// the frame (clamp-to-edge).
pub fn region_bounds(
    frame_width: u32,
    frame_height: u32,
    sensor_box: &SensorBox,
    padding: u32,
) -> Option<RegionBounds> {
    if !sensor_box.is_finite() || sensor_box.width() <= 0.0 || sensor_box.height() <= 0.0 {
        return None;
    }

    let left = sensor_box.left.floor() as i64;
    let top = sensor_box.top.floor() as i64;
    let right = sensor_box.right.ceil() as i64;
    let bottom = sensor_box.bottom.ceil() as i64;
    let pad = padding as i64;

    let (x, width) = clamp_axis(left, right, pad, frame_width as i64);
    let (y, height) = clamp_axis(top, bottom, pad, frame_height as i64);

    Some(RegionBounds {
        x,
        y,
        width: width as u32,
        height: height as u32,
    })
}

fn clamp_axis(start: i64, end: i64, pad: i64, limit: i64) -> (i64, i64) {
    let origin = start.saturating_sub(pad);
    let extent = end.saturating_sub(start).saturating_add(pad.saturating_mul(2));
    if extent < limit {
        (origin, extent)
    } else {
        // A full-width crop has exactly one in-frame position.
        (0, limit)
    }
}

/// Crop a padded region around `sensor_box` onto a white canvas.
///
/// Returns `None` when the box is empty or not finite. The frame is only read.
pub fn extract_region(frame: &Frame, sensor_box: &SensorBox, padding: u32) -> Option<RgbImage> {
    let bounds = region_bounds(frame.width(), frame.height(), sensor_box, padding)?;

    let mut canvas = RgbImage::from_pixel(bounds.width, bounds.height, BACKGROUND);
    image::imageops::overlay(&mut canvas, frame.image(), bounds.x.saturating_neg(), bounds.y.saturating_neg());
    Some(canvas)
}
