use codescan::{
    ChannelTracker, Classifier, CodeReader, DetectionBox, Flush, FlushCause, Frame, ReadOutcome, Rect, Rotation,
};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use qrcode::QrCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Returns the same boxes for every frame, optionally taking its time.
pub struct FixedClassifier {
    pub input_size: u32,
    pub boxes: Vec<DetectionBox>,
    pub delay: Option<Duration>,
    pub calls: Arc<AtomicUsize>,
}

impl FixedClassifier {
    pub fn new(boxes: Vec<DetectionBox>) -> Self {
        Self {
            input_size: 300,
            boxes,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Classifier for FixedClassifier {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn classify(&self, input: &RgbImage) -> anyhow::Result<Vec<DetectionBox>> {
        anyhow::ensure!(input.width() == self.input_size, "wrong input size");
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        Ok(self.boxes.clone())
    }
}

/// Box in normalized model coordinates, given in model pixels of a 300 square.
pub fn model_box(left: f32, top: f32, right: f32, bottom: f32, score: f32) -> DetectionBox {
    DetectionBox {
        rect: Rect::new(left / 300.0, top / 300.0, right / 300.0, bottom / 300.0),
        class_index: 0,
        score,
    }
}

/// Stands in for a real decode engine: only the binarized (enhanced) crop
/// "reads", and every attempt is logged.
#[derive(Clone)]
pub struct EnhancedOnlyReader {
    pub value: String,
    pub attempts: Arc<Mutex<Vec<&'static str>>>,
}

impl EnhancedOnlyReader {
    pub fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl CodeReader for EnhancedOnlyReader {
    fn read(&self, image: &DynamicImage) -> Option<ReadOutcome> {
        let enhanced = matches!(image, DynamicImage::ImageLuma8(_));
        self.attempts
            .lock()
            .unwrap()
            .push(if enhanced { "enhanced" } else { "raw" });
        enhanced.then(|| ReadOutcome {
            value: self.value.clone(),
            confidence: None,
        })
    }
}

/// A QR symbol holding `text`, drawn with the given module shades and size.
pub fn qr_symbol(text: &str, dark: u8, light: u8, module: u32) -> GrayImage {
    QrCode::new(text.as_bytes())
        .unwrap()
        .render::<Luma<u8>>()
        .dark_color(Luma([dark]))
        .light_color(Luma([light]))
        .module_dimensions(module, module)
        .build()
}

/// Grey frame with `symbol` pasted at (`x`, `y`).
pub fn frame_with_symbol(width: u32, height: u32, symbol: &GrayImage, x: i64, y: i64) -> Frame {
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([120, 120, 120]));
    image::imageops::overlay(&mut canvas, &DynamicImage::ImageLuma8(symbol.clone()).to_rgb8(), x, y);
    Frame::new(canvas, Rotation::NONE).unwrap()
}

/// Frame of uniform grey, the size of a typical preview stream.
pub fn grey_frame(width: u32, height: u32, rotation: Rotation) -> Frame {
    Frame::new(RgbImage::from_pixel(width, height, Rgb([120, 120, 120])), rotation).unwrap()
}

/// Config with one worker and a single queue slot.
pub fn narrow_config() -> codescan::ScannerConfig {
    codescan::ScannerConfig {
        max_in_flight: 1,
        queue_depth: 1,
        ..codescan::ScannerConfig::default()
    }
}

pub fn tracker() -> (ChannelTracker, UnboundedReceiver<Flush>) {
    ChannelTracker::new()
}

/// Wait for the next flush with the given cause, dropping others.
pub async fn next_flush(flushes: &mut UnboundedReceiver<Flush>, cause: FlushCause) -> Flush {
    loop {
        let flush = tokio::time::timeout(Duration::from_secs(30), flushes.recv())
            .await
            .expect("timed out waiting for a flush")
            .expect("tracker channel closed");
        if flush.cause == cause {
            return flush;
        }
    }
}

/// Collects everything handed to the upload sink.
pub fn upload_recorder() -> (impl Fn(Vec<String>) + Send + Sync + 'static, Arc<Mutex<Vec<String>>>) {
    let uploaded = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let uploaded = uploaded.clone();
        move |values: Vec<String>| uploaded.lock().unwrap().extend(values)
    };
    (sink, uploaded)
}
