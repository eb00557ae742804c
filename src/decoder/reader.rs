use image::DynamicImage;
use rqrr::PreparedImage;
use rxing::{BarcodeFormat, DecodeHints};
use std::sync::Arc;

use super::{CodeReader, ReadOutcome};

/// QR reader backed by `rqrr`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RqrrReader;

impl CodeReader for RqrrReader {
    fn read(&self, image: &DynamicImage) -> Option<ReadOutcome> {
        let gray = image.to_luma8();
        let (width, height) = (gray.width() as usize, gray.height() as usize);
        if width == 0 || height == 0 {
            return None;
        }

        let mut prepared =
            PreparedImage::prepare_from_greyscale(width, height, |x, y| gray.get_pixel(x as u32, y as u32)[0]);
        prepared
            .detect_grids()
            .into_iter()
            .find_map(|grid| grid.decode().ok())
            .map(|(_meta, content)| ReadOutcome {
                value: content,
                confidence: None,
            })
    }
}

/// Data Matrix reader backed by `rxing`, in try-harder mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataMatrixReader;

impl CodeReader for DataMatrixReader {
    fn read(&self, image: &DynamicImage) -> Option<ReadOutcome> {
        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let mut hints = DecodeHints {
            TryHarder: Some(true),
            ..DecodeHints::default()
        };
        match rxing::helpers::detect_in_luma_with_hints(
            gray.into_raw(),
            width,
            height,
            Some(BarcodeFormat::DATA_MATRIX),
            &mut hints,
        ) {
            Ok(result) => Some(ReadOutcome {
                value: result.getText().to_string(),
                confidence: None,
            }),
            Err(e) => {
                tracing::trace!(error = %e, "no data matrix");
                None
            }
        }
    }
}

/// Tries several engines in order; the first one that reads wins.
#[derive(Clone)]
pub struct ReaderChain {
    readers: Vec<Arc<dyn CodeReader>>,
}

impl ReaderChain {
    pub fn new(readers: Vec<Arc<dyn CodeReader>>) -> Self {
        Self { readers }
    }

    /// Data Matrix first, then QR.
    pub fn standard() -> Self {
        Self::new(vec![Arc::new(DataMatrixReader) as Arc<dyn CodeReader>, Arc::new(RqrrReader)])
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

impl Default for ReaderChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl CodeReader for ReaderChain {
    fn read(&self, image: &DynamicImage) -> Option<ReadOutcome> {
        self.readers.iter().find_map(|reader| reader.read(image))
    }
}
