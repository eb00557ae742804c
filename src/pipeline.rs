//! One detection cycle: frame → classifier → crops → decode → cache → tracker.

use image::DynamicImage;
use std::sync::Arc;

use crate::cache::ResultCache;
use crate::classifier::{Classifier, LabelMap, ModelInput};
use crate::decoder::Decoder;
use crate::error::{Result, ScanError};
use crate::models::{DetectionBox, Frame, Recognition};
use crate::region::extract_region;
use crate::tracker::{CodeLedger, Flush, FlushCause, Tracker, UploadSink};
use crate::transform::TransformPair;

/// Where a cycle is. Every cycle walks the states in declaration order and
/// ends back at `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    FrameReady,
    Detecting,
    ExtractingDecoding,
    Flushed,
}

impl CycleState {
    pub fn next(self) -> CycleState {
        match self {
            CycleState::Idle => CycleState::FrameReady,
            CycleState::FrameReady => CycleState::Detecting,
            CycleState::Detecting => CycleState::ExtractingDecoding,
            CycleState::ExtractingDecoding => CycleState::Flushed,
            CycleState::Flushed => CycleState::Idle,
        }
    }
}

/// Boxes worth decoding: score strictly above `threshold`.
pub fn select_candidates(boxes: &[DetectionBox], threshold: f32) -> impl Iterator<Item = &DetectionBox> {
    boxes.iter().filter(move |detection| detection.score > threshold)
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub sequence: u64,
    pub detections: usize,
    pub candidates: usize,
    /// Recognitions decoded from this frame
    pub decoded: Vec<Recognition>,
    /// Values seen for the first time this session
    pub new_values: Vec<String>,
    pub state: CycleState,
}

/// Everything a cycle needs, shared by every worker.
pub struct DetectionCycle {
    pub(crate) classifier: Arc<dyn Classifier>,
    pub(crate) labels: LabelMap,
    pub(crate) decoder: Decoder,
    pub(crate) cache: ResultCache,
    pub(crate) tracker: Arc<dyn Tracker>,
    pub(crate) upload: Arc<dyn UploadSink>,
    pub(crate) ledger: CodeLedger,
    pub(crate) confidence_threshold: f32,
    pub(crate) region_padding: u32,
    pub(crate) max_detections: usize,
}

impl DetectionCycle {
    /// Run a full cycle for `frame`.
    ///
    /// Errors leave the cache untouched and skip the flush.
    pub fn run(&self, frame: &Frame, pair: &TransformPair) -> Result<CycleReport> {
        let sequence = frame.sequence();
        let mut state = CycleState::Idle;
        let advance = |state: &mut CycleState| {
            *state = state.next();
            tracing::trace!(sequence, state = ?*state, "cycle state");
        };

        advance(&mut state);
        let input = ModelInput::prepare(frame, pair);
        let input_size = self.classifier.input_size();
        let (width, height) = input.image().dimensions();
        if (width, height) != (input_size, input_size) {
            return Err(ScanError::InputShape {
                expected: input_size,
                width,
                height,
            });
        }

        advance(&mut state);
        let boxes = self
            .classifier
            .classify(input.image())
            .map_err(|e| ScanError::Classifier(e.into()))?;
        if boxes.len() > self.max_detections {
            return Err(ScanError::OutputShape {
                max: self.max_detections,
                actual: boxes.len(),
            });
        }

        advance(&mut state);
        let mut candidates = 0;
        let mut decoded = Vec::new();
        for detection in select_candidates(&boxes, self.confidence_threshold) {
            candidates += 1;
            let sensor = pair.to_sensor(&detection.model_rect(input_size));
            let Some(region) = extract_region(frame, &sensor, self.region_padding) else {
                tracing::debug!(sequence, ?sensor, "detection maps to an empty region");
                continue;
            };
            let Some(result) = self.decoder.decode(&DynamicImage::ImageRgb8(region)) else {
                continue;
            };
            let recognition = Recognition {
                id: result.value,
                label: self.labels.label(detection.class_index).to_string(),
                confidence: result.confidence,
                location: sensor,
            };
            self.cache.upsert(recognition.clone());
            decoded.push(recognition);
        }

        advance(&mut state);
        let new_values: Vec<String> = decoded
            .iter()
            .filter(|recognition| self.ledger.record(&recognition.id))
            .map(|recognition| recognition.id.clone())
            .collect();
        if !new_values.is_empty() {
            tracing::info!(sequence, values = ?new_values, "new codes");
            self.upload.submit(new_values.clone());
        }
        self.tracker.track(Flush {
            timestamp: sequence,
            recognitions: self.cache.snapshot(),
            cause: FlushCause::Cycle,
        });
        tracing::debug!(
            sequence,
            detections = boxes.len(),
            candidates,
            decoded = decoded.len(),
            "cycle flushed"
        );

        Ok(CycleReport {
            sequence,
            detections: boxes.len(),
            candidates,
            decoded,
            new_values,
            state,
        })
    }
}
