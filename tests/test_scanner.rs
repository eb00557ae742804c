//! End-to-end tests for the running scanner.
//!
//! Tests cover:
//! - The full detect → crop → decode → flush path
//! - The confidence filter
//! - Skipping frames while every worker is busy
//! - Startup failures and per-cycle failures

mod common;

use common::*;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_code_is_decoded_on_second_pass() -> anyhow::Result<()> {
    let (tracker, mut flushes) = tracker();
    let reader = EnhancedOnlyReader::new("ABC123");
    let (upload, uploaded) = upload_recorder();
    let scanner = ScannerBuilder::new(ScannerConfig::default())
        .classifier(|| Ok(FixedClassifier::new(vec![model_box(10.0, 10.0, 50.0, 50.0, 0.9)])))
        .reader(reader.clone())
        .tracker(tracker)
        .upload(upload)
        .start()?;

    let disposition = scanner.submit(grey_frame(640, 480, Rotation::NONE))?;
    assert_eq!(disposition, FrameDisposition::Queued { sequence: 1 });

    let flush = next_flush(&mut flushes, FlushCause::Cycle).await;
    assert_eq!(flush.timestamp, 1);
    assert_eq!(flush.recognitions.len(), 1);

    let recognition = &flush.recognitions[0];
    assert_eq!(recognition.id, "ABC123");
    assert_eq!(recognition.confidence, 1.0);
    let location = recognition.location;
    let expected = Rect::new(10.0 * 640.0 / 300.0, 10.0 * 1.6, 50.0 * 640.0 / 300.0, 50.0 * 1.6);
    assert!((location.left - expected.left).abs() < 1e-2);
    assert!((location.top - expected.top).abs() < 1e-2);
    assert!((location.right - expected.right).abs() < 1e-2);
    assert!((location.bottom - expected.bottom).abs() < 1e-2);

    assert_eq!(*reader.attempts.lock().unwrap(), vec!["raw", "enhanced"]);
    assert_eq!(*uploaded.lock().unwrap(), vec!["ABC123".to_string()]);
    assert_eq!(scanner.ledger().codes(), vec!["ABC123".to_string()]);

    let stats = scanner.shutdown().await;
    assert_eq!(stats.cycles_completed, 1);
    assert_eq!(stats.recognitions, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_low_scores_are_never_decoded() -> anyhow::Result<()> {
    let (tracker, mut flushes) = tracker();
    let reader = EnhancedOnlyReader::new("IGNORED");
    let scanner = ScannerBuilder::new(ScannerConfig::default())
        .classifier(|| {
            Ok(FixedClassifier::new(vec![
                model_box(10.0, 10.0, 50.0, 50.0, 0.1),
                model_box(100.0, 100.0, 150.0, 150.0, 0.05),
                model_box(200.0, 200.0, 250.0, 250.0, 0.0),
            ]))
        })
        .reader(reader.clone())
        .tracker(tracker)
        .start()?;

    scanner.submit(grey_frame(640, 480, Rotation::NONE))?;
    let flush = next_flush(&mut flushes, FlushCause::Cycle).await;
    assert!(flush.recognitions.is_empty());
    assert!(reader.attempts.lock().unwrap().is_empty());

    let stats = scanner.shutdown().await;
    assert_eq!(stats.cycles_completed, 1);
    assert_eq!(stats.recognitions, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_score_just_above_threshold_is_decoded() -> anyhow::Result<()> {
    let (tracker, mut flushes) = tracker();
    let reader = EnhancedOnlyReader::new("EDGE");
    let scanner = ScannerBuilder::new(ScannerConfig::default())
        .classifier(|| Ok(FixedClassifier::new(vec![model_box(10.0, 10.0, 50.0, 50.0, 0.11)])))
        .reader(reader.clone())
        .tracker(tracker)
        .start()?;

    scanner.submit(grey_frame(640, 480, Rotation::NONE))?;
    let flush = next_flush(&mut flushes, FlushCause::Cycle).await;
    assert_eq!(flush.recognitions.len(), 1);
    assert_eq!(reader.attempts.lock().unwrap().len(), 2);

    scanner.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_busy_workers_skip_frames() -> anyhow::Result<()> {
    let classifier = FixedClassifier::new(Vec::new()).slow(Duration::from_millis(300));
    let calls = classifier.calls.clone();
    let scanner = ScannerBuilder::new(narrow_config())
        .classifier(move || Ok(classifier))
        .start()?;

    let mut queued = 0;
    let mut skipped = 0;
    for expected in 1..=6 {
        match scanner.submit(grey_frame(320, 240, Rotation::NONE))? {
            FrameDisposition::Queued { sequence } => {
                assert_eq!(sequence, expected);
                queued += 1;
            }
            FrameDisposition::Skipped { sequence } => {
                assert_eq!(sequence, expected);
                skipped += 1;
            }
        }
    }
    // One running, one waiting for a permit, one in the queue at most.
    assert!(queued <= 3, "queued {queued}");
    assert!(skipped >= 3, "skipped {skipped}");

    let stats = scanner.shutdown().await;
    assert_eq!(stats.frames_received, 6);
    assert_eq!(stats.frames_skipped, skipped);
    assert_eq!(stats.cycles_completed, queued);
    assert_eq!(calls.load(Ordering::SeqCst) as u64, queued);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_cycles_do_not_stop_intake() -> anyhow::Result<()> {
    // More boxes than the configured maximum: every cycle fails its output check.
    let classifier = FixedClassifier::new(vec![model_box(10.0, 10.0, 50.0, 50.0, 0.5); 11]);
    let scanner = ScannerBuilder::new(ScannerConfig::default())
        .classifier(move || Ok(classifier))
        .start()?;

    for _ in 0..3 {
        scanner.submit(grey_frame(64, 48, Rotation::NONE))?;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let stats = scanner.shutdown().await;
    assert_eq!(stats.frames_received, 3);
    assert_eq!(stats.cycles_completed, 0);
    assert_eq!(stats.cycles_failed + stats.frames_skipped, 3);
    Ok(())
}

#[tokio::test]
async fn test_classifier_load_failure_prevents_start() {
    let result = ScannerBuilder::new(ScannerConfig::default())
        .classifier(|| -> anyhow::Result<FixedClassifier> { anyhow::bail!("model file missing") })
        .start();

    match result {
        Err(ScanError::ClassifierUnavailable(source)) => {
            assert_eq!(source.to_string(), "model file missing");
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("scanner started without a classifier"),
    }
}

#[tokio::test]
async fn test_geometry_follows_size_and_rotation() -> anyhow::Result<()> {
    let scanner = ScannerBuilder::new(ScannerConfig::default())
        .classifier(|| Ok(FixedClassifier::new(Vec::new())))
        .start()?;

    scanner.submit(grey_frame(64, 48, Rotation::NONE))?;
    scanner.submit(grey_frame(64, 48, Rotation::NONE))?;
    assert_eq!(scanner.geometry().recompute_count(), 1);

    scanner.submit(grey_frame(64, 48, Rotation::from_degrees(90)?))?;
    scanner.submit(grey_frame(48, 64, Rotation::from_degrees(90)?))?;
    assert_eq!(scanner.geometry().recompute_count(), 3);

    scanner.shutdown().await;
    Ok(())
}
