use anyhow::Context;
use clap::Parser;
use image::ImageReader;
use std::path::PathBuf;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

use codescan::{
    ChannelTracker, ContourClassifier, Frame, FrameDisposition, LabelMap, ReaderChain, Rotation, ScannerBuilder,
    ScannerConfig,
};

#[derive(Parser)]
#[command(name = "codescan")]
#[command(about = "Find and decode 2D codes in a stream of camera frames")]
struct Cli {
    /// Frame images, submitted in the order given
    #[arg(value_name = "IMAGE", required = true)]
    frames: Vec<PathBuf>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Label file, one class name per line after the background line
    #[arg(long, value_name = "FILE")]
    labels: Option<PathBuf>,

    /// Device rotation in degrees (multiple of 90)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    rotation: i32,

    /// Frames submitted per second
    #[arg(long, default_value_t = 10.0)]
    fps: f64,

    /// Pixels added around each detection before decoding
    #[arg(long)]
    padding: Option<u32>,

    /// Minimum detection score to attempt a decode (exclusive)
    #[arg(long)]
    threshold: Option<f32>,

    /// Detection cycles allowed to run at once
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn scanner_config(&self) -> anyhow::Result<ScannerConfig> {
        let mut config = match &self.config {
            Some(path) => ScannerConfig::load(path).with_context(|| format!("Failed to load config {path:?}"))?,
            None => ScannerConfig::default(),
        };
        if let Some(padding) = self.padding {
            config.region_padding = padding;
        }
        if let Some(threshold) = self.threshold {
            config.confidence_threshold = threshold;
        }
        if let Some(max_in_flight) = self.max_in_flight {
            config.max_in_flight = max_in_flight;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Time between submitted frames; `tokio::time::interval` needs it non-zero.
fn frame_interval(fps: f64) -> anyhow::Result<Duration> {
    anyhow::ensure!(fps.is_finite() && fps > 0.0, "--fps must be a positive number, got {fps}");
    let interval = Duration::try_from_secs_f64(1.0 / fps)?;
    anyhow::ensure!(!interval.is_zero(), "--fps {fps} is too high");
    Ok(interval)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();

    let interval = frame_interval(args.fps)?;
    let config = args.scanner_config()?;
    let rotation = Rotation::from_degrees(args.rotation)?;
    let labels = match &args.labels {
        Some(path) => LabelMap::load(path).with_context(|| format!("Failed to read labels {path:?}"))?,
        None => LabelMap::from_text("background\ncode"),
    };

    let (tracker, mut flushes) = ChannelTracker::new();
    let input_size = config.model_input_size;
    let max_detections = config.max_detections;
    let scanner = ScannerBuilder::new(config)
        .classifier(move || Ok(ContourClassifier::new(input_size).with_max_detections(max_detections)))
        .reader(ReaderChain::standard())
        .labels(labels)
        .tracker(tracker)
        .upload(|values: Vec<String>| tracing::info!(?values, "ready for upload"))
        .start()?;

    let printer = tokio::spawn(async move {
        while let Some(flush) = flushes.recv().await {
            if flush.recognitions.is_empty() {
                continue;
            }
            println!("frame {}:", flush.timestamp);
            for recognition in &flush.recognitions {
                let at = recognition.location;
                println!(
                    "  {} [{}] at ({:.0}, {:.0})-({:.0}, {:.0}) - confidence: {:.2}",
                    recognition.id, recognition.label, at.left, at.top, at.right, at.bottom, recognition.confidence
                );
            }
        }
    });

    let mut ticker = tokio::time::interval(interval);
    for path in &args.frames {
        ticker.tick().await;
        let img = ImageReader::open(path)?
            .decode()
            .map_err(|e| anyhow::anyhow!("Failed to decode image {path:?}: {}", e))?;
        let frame = Frame::new(img.to_rgb8(), rotation)?;
        if let FrameDisposition::Skipped { sequence } = scanner.submit(frame)? {
            tracing::debug!(sequence, ?path, "frame skipped");
        }
    }

    let ledger = scanner.ledger().clone();
    let stats = scanner.shutdown().await;
    printer.await?;
    let codes = ledger.codes();

    println!("\n=== Session ===");
    println!(
        "Frames: {} received, {} skipped; cycles: {} ok, {} failed",
        stats.frames_received, stats.frames_skipped, stats.cycles_completed, stats.cycles_failed
    );
    if codes.is_empty() {
        println!("No codes decoded.");
    } else {
        println!("Decoded codes:");
        for code in codes {
            println!("  {code}");
        }
    }

    Ok(())
}
