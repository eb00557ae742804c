use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures the scanner reports to its caller.
///
/// Everything except `ClassifierUnavailable`, `NoRuntime` and `Config` is scoped
/// to a single frame cycle: the cycle is logged and skipped, intake carries on.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("degenerate frame: {width}x{height}")]
    DegenerateFrame { width: u32, height: u32 },

    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("rotation of {0} degrees is not a multiple of 90")]
    UnsupportedRotation(i32),

    #[error("classifier input must be {expected}x{expected}, got {width}x{height}")]
    InputShape { expected: u32, width: u32, height: u32 },

    #[error("classifier returned {actual} detections, at most {max} allowed")]
    OutputShape { max: usize, actual: usize },

    #[error("classification failed")]
    Classifier(#[source] BoxError),

    #[error("classifier unavailable")]
    ClassifierUnavailable(#[source] BoxError),

    #[error("scanner must be started inside a tokio runtime")]
    NoRuntime,

    #[error("scanner has stopped")]
    Stopped,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration")]
    ConfigParse(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// True for failures that only invalidate the current cycle.
    pub fn is_cycle_local(&self) -> bool {
        matches!(
            self,
            ScanError::DegenerateFrame { .. }
                | ScanError::BufferSize { .. }
                | ScanError::UnsupportedRotation(_)
                | ScanError::InputShape { .. }
                | ScanError::OutputShape { .. }
                | ScanError::Classifier(_)
        )
    }
}

pub type Result<T, E = ScanError> = std::result::Result<T, E>;
