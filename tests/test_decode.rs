//! Decoding real rendered symbols with the shipped engines.
//!
//! Tests cover:
//! - A clean QR read on the raw pass
//! - A QR too faint for the raw pass, read after enhancement
//! - The default scanner reader decoding a symbol inside a frame

mod common;

use codescan::{DecodeStrategy, Decoder, EnhanceConfig, ReaderChain, RqrrReader};
use common::*;
use image::DynamicImage;
use std::sync::Arc;

#[test]
fn test_clean_symbol_reads_on_raw_pass() {
    let symbol = qr_symbol("ABC123", 0, 255, 8);
    let decoder = Decoder::new(Arc::new(RqrrReader), EnhanceConfig::default());

    let decoded = decoder.decode(&DynamicImage::ImageLuma8(symbol)).unwrap();
    assert_eq!(decoded.value, "ABC123");
    assert_eq!(decoded.confidence, 1.0);
    assert_eq!(decoded.strategy, DecodeStrategy::Raw);
}

#[test]
fn test_faint_symbol_needs_enhancement() {
    // Under 4% contrast: below what the QR engine's own binarizer separates.
    let symbol = DynamicImage::ImageLuma8(qr_symbol("ABC123", 160, 166, 4));

    let raw_only = Decoder::new(Arc::new(RqrrReader), EnhanceConfig::default())
        .with_strategies(vec![DecodeStrategy::Raw]);
    assert!(raw_only.decode(&symbol).is_none());

    let decoder = Decoder::new(Arc::new(RqrrReader), EnhanceConfig::default());
    let decoded = decoder.decode(&symbol).unwrap();
    assert_eq!(decoded.value, "ABC123");
    assert_eq!(decoded.confidence, 1.0);
    assert_eq!(decoded.strategy, DecodeStrategy::Enhanced);
}

#[test]
fn test_standard_chain_falls_through_to_qr() {
    let symbol = DynamicImage::ImageLuma8(qr_symbol("ABC123", 0, 255, 8));
    let decoder = Decoder::new(Arc::new(ReaderChain::standard()), EnhanceConfig::default());

    let decoded = decoder.decode(&symbol).unwrap();
    assert_eq!(decoded.value, "ABC123");
    assert_eq!(decoded.confidence, 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_default_reader_decodes_symbol_in_frame() -> anyhow::Result<()> {
    let symbol = qr_symbol("ABC123", 0, 255, 6);
    let (x, y) = (200, 120);
    let frame = frame_with_symbol(640, 480, &symbol, x, y);

    // Model box covering the symbol, in 300-pixel model space.
    let (sx, sy) = (300.0 / 640.0, 300.0 / 480.0);
    let detection = model_box(
        x as f32 * sx,
        y as f32 * sy,
        (x as f32 + symbol.width() as f32) * sx,
        (y as f32 + symbol.height() as f32) * sy,
        0.9,
    );

    let (tracker, mut flushes) = tracker();
    let scanner = ScannerBuilder::new(ScannerConfig::default())
        .classifier(move || Ok(FixedClassifier::new(vec![detection])))
        .tracker(tracker)
        .start()?;

    scanner.submit(frame)?;
    let flush = next_flush(&mut flushes, FlushCause::Cycle).await;
    assert_eq!(flush.recognitions.len(), 1);
    assert_eq!(flush.recognitions[0].id, "ABC123");
    assert_eq!(flush.recognitions[0].confidence, 1.0);

    scanner.shutdown().await;
    Ok(())
}
