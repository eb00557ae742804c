pub mod enhance;
pub mod reader;

use image::DynamicImage;
use std::borrow::Cow;
use std::sync::Arc;

use crate::config::EnhanceConfig;

pub use reader::{DataMatrixReader, ReaderChain, RqrrReader};

/// What a decode engine reports for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome {
    pub value: String,
    /// Most engines do not report one
    pub confidence: Option<f32>,
}

/// A machine-readable code decode engine.
pub trait CodeReader: Send + Sync {
    /// Look for a single code in `image`. `None` means nothing was decoded.
    fn read(&self, image: &DynamicImage) -> Option<ReadOutcome>;
}

/// How a region is prepared before it reaches the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// The crop exactly as captured
    Raw,
    /// The crop after [`enhance::enhance`]
    Enhanced,
}

impl DecodeStrategy {
    /// Raw first: enhancement costs more and can spoil crops that were fine.
    pub const DEFAULT_ORDER: [DecodeStrategy; 2] = [DecodeStrategy::Raw, DecodeStrategy::Enhanced];

    fn prepare<'a>(&self, region: &'a DynamicImage, config: &EnhanceConfig) -> Cow<'a, DynamicImage> {
        match self {
            DecodeStrategy::Raw => Cow::Borrowed(region),
            DecodeStrategy::Enhanced => Cow::Owned(DynamicImage::ImageLuma8(enhance::enhance(region, config))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub value: String,
    pub confidence: f32,
    pub strategy: DecodeStrategy,
}

/// Runs the strategy list against a reader, stopping at the first success.
#[derive(Clone)]
pub struct Decoder {
    reader: Arc<dyn CodeReader>,
    enhance: EnhanceConfig,
    strategies: Vec<DecodeStrategy>,
}

impl Decoder {
    pub fn new(reader: Arc<dyn CodeReader>, enhance: EnhanceConfig) -> Self {
        Self {
            reader,
            enhance,
            strategies: DecodeStrategy::DEFAULT_ORDER.to_vec(),
        }
    }

    pub fn with_strategies(mut self, strategies: Vec<DecodeStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn strategies(&self) -> &[DecodeStrategy] {
        &self.strategies
    }

    /// Decode one region. An empty payload counts as a miss.
    pub fn decode(&self, region: &DynamicImage) -> Option<Decoded> {
        for &strategy in &self.strategies {
            let prepared = strategy.prepare(region, &self.enhance);
            match self.reader.read(&prepared) {
                Some(outcome) if !outcome.value.is_empty() => {
                    tracing::trace!(?strategy, value = %outcome.value, "decoded region");
                    return Some(Decoded {
                        value: outcome.value,
                        confidence: outcome.confidence.unwrap_or(1.0).clamp(0.0, 1.0),
                        strategy,
                    });
                }
                _ => tracing::trace!(?strategy, "no code in region"),
            }
        }
        None
    }
}
