pub mod cache;
pub mod classifier;
pub mod config;
pub mod decoder;
pub mod detection;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod region;
pub mod scheduler;
pub mod tracker;
pub mod transform;

pub use cache::ResultCache;
pub use classifier::{Classifier, LabelMap, ModelInput, TensorData};
pub use config::{EnhanceConfig, ScannerConfig};
pub use decoder::{
    CodeReader, DataMatrixReader, DecodeStrategy, Decoded, Decoder, ReadOutcome, ReaderChain, RqrrReader,
};
pub use detection::ContourClassifier;
pub use error::{Result, ScanError};
pub use models::{DetectionBox, Frame, Recognition, Rect, Rotation, SensorBox};
pub use pipeline::{CycleReport, CycleState, DetectionCycle};
pub use region::extract_region;
pub use scheduler::{FrameDisposition, Scanner, ScannerBuilder, StatsSnapshot};
pub use tracker::{ChannelTracker, CodeLedger, Flush, FlushCause, Tracker, UploadSink};
pub use transform::{SessionGeometry, TransformPair};
