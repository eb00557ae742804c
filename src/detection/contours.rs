use image::{GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::models::Contour;

/// Bounding boxes of the 8-connected foreground blobs in `binary` with at
/// least `min_pixels` pixels, ordered by label.
pub fn find_contours(binary: &GrayImage, min_pixels: u32) -> Vec<Contour> {
    let labeled = connected_components(binary, Connectivity::Eight, Luma([0]));

    // Labels are dense from 1, so a Vec indexed by label replaces a map.
    let mut blobs: Vec<Option<Contour>> = Vec::new();
    for (x, y, pixel) in labeled.enumerate_pixels() {
        let label = pixel[0];
        if label == 0 {
            continue;
        }
        let slot = label as usize;
        if blobs.len() <= slot {
            blobs.resize(slot + 1, None);
        }
        match &mut blobs[slot] {
            Some(blob) => {
                blob.min_x = blob.min_x.min(x);
                blob.min_y = blob.min_y.min(y);
                blob.max_x = blob.max_x.max(x);
                blob.max_y = blob.max_y.max(y);
                blob.pixel_count += 1;
            }
            empty => {
                *empty = Some(Contour {
                    label,
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                    pixel_count: 1,
                })
            }
        }
    }

    blobs
        .into_iter()
        .flatten()
        .filter(|blob| blob.pixel_count >= min_pixels)
        .collect()
}
