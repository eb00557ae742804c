mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from codescan for tests
pub use codescan::{
    ChannelTracker, Classifier, CodeReader, DetectionBox, Flush, FlushCause, Frame, FrameDisposition, ReadOutcome,
    Recognition, Rect, Rotation, ScanError, Scanner, ScannerBuilder, ScannerConfig,
};
