use image::{GrayImage, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;

/// Parameters of the edge map the proposer searches for code-like texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeParams {
    pub blur_sigma: f32,
    pub low_threshold: f32,
    pub high_threshold: f32,
    /// Dilation radius that fuses neighbouring module edges into one blob
    pub bridge_radius: u8,
}

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            blur_sigma: 1.5,
            low_threshold: 50.0,
            high_threshold: 100.0,
            bridge_radius: 2,
        }
    }
}

/// Binary map of edges, thickened so the modules of one code touch.
pub fn edge_map(input: &RgbImage, params: &EdgeParams) -> GrayImage {
    let gray = image::imageops::grayscale(input);
    let blurred = gaussian_blur_f32(&gray, params.blur_sigma);
    let edges = canny(&blurred, params.low_threshold, params.high_threshold);
    if params.bridge_radius == 0 {
        return edges;
    }
    dilate(&edges, Norm::LInf, params.bridge_radius)
}
