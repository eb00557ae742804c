//! Frame intake, worker admission and the eviction timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::cache::ResultCache;
use crate::classifier::{Classifier, LabelMap};
use crate::config::ScannerConfig;
use crate::decoder::{CodeReader, Decoder, ReaderChain};
use crate::error::{Result, ScanError};
use crate::models::{Frame, Recognition};
use crate::pipeline::{CycleReport, DetectionCycle};
use crate::tracker::{CodeLedger, Flush, FlushCause, Tracker, UploadSink};
use crate::transform::{SessionGeometry, TransformPair};

/// What intake did with a submitted frame. Either way the caller may reuse
/// its buffer immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Waiting for a worker
    Queued { sequence: u64 },
    /// Dropped because every worker and queue slot was taken
    Skipped { sequence: u64 },
}

impl FrameDisposition {
    pub fn sequence(&self) -> u64 {
        match self {
            FrameDisposition::Queued { sequence } | FrameDisposition::Skipped { sequence } => *sequence,
        }
    }
}

#[derive(Debug, Default)]
pub struct ScanStats {
    frames_received: AtomicU64,
    frames_skipped: AtomicU64,
    cycles_completed: AtomicU64,
    cycles_failed: AtomicU64,
    recognitions: AtomicU64,
    evictions: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub frames_skipped: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub recognitions: u64,
    pub evictions: u64,
}

impl ScanStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            recognitions: self.recognitions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn record_cycle(&self, outcome: std::result::Result<Result<CycleReport>, JoinError>) {
        match outcome {
            Ok(Ok(report)) => {
                Self::bump(&self.cycles_completed, 1);
                Self::bump(&self.recognitions, report.decoded.len() as u64);
            }
            Ok(Err(err)) => {
                Self::bump(&self.cycles_failed, 1);
                tracing::warn!(error = %err, "skipped detection cycle");
            }
            Err(err) => {
                Self::bump(&self.cycles_failed, 1);
                tracing::error!(error = %err, "detection worker died");
            }
        }
    }
}

struct Job {
    frame: Frame,
    pair: Arc<TransformPair>,
}

type ClassifierLoader = Box<dyn FnOnce() -> anyhow::Result<Arc<dyn Classifier>> + Send>;

/// Collects the scanner's collaborators, then [`start`](Self::start)s it.
pub struct ScannerBuilder {
    config: ScannerConfig,
    classifier: Option<ClassifierLoader>,
    reader: Arc<dyn CodeReader>,
    labels: LabelMap,
    tracker: Arc<dyn Tracker>,
    upload: Arc<dyn UploadSink>,
}

impl ScannerBuilder {
    pub fn new(config: ScannerConfig) -> Self {
        Self {
            config,
            classifier: None,
            reader: Arc::new(ReaderChain::standard()),
            labels: LabelMap::default(),
            tracker: Arc::new(|_: Flush| {}),
            upload: Arc::new(|_: Vec<String>| {}),
        }
    }

    /// The loader runs once inside [`start`](Self::start); its error aborts startup.
    pub fn classifier<C, F>(mut self, load: F) -> Self
    where
        C: Classifier + 'static,
        F: FnOnce() -> anyhow::Result<C> + Send + 'static,
    {
        self.classifier = Some(Box::new(move || {
            let classifier: Arc<dyn Classifier> = Arc::new(load()?);
            Ok(classifier)
        }));
        self
    }

    pub fn reader(mut self, reader: impl CodeReader + 'static) -> Self {
        self.reader = Arc::new(reader);
        self
    }

    pub fn labels(mut self, labels: LabelMap) -> Self {
        self.labels = labels;
        self
    }

    pub fn tracker(mut self, tracker: impl Tracker + 'static) -> Self {
        self.tracker = Arc::new(tracker);
        self
    }

    pub fn upload(mut self, upload: impl UploadSink + 'static) -> Self {
        self.upload = Arc::new(upload);
        self
    }

    /// Load the classifier and spawn the dispatcher and eviction tasks on the
    /// current tokio runtime.
    pub fn start(self) -> Result<Scanner> {
        let config = self.config;
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ScanError::NoRuntime)?;

        let load = self
            .classifier
            .ok_or_else(|| ScanError::ClassifierUnavailable("no classifier configured".into()))?;
        let classifier = load().map_err(|e| ScanError::ClassifierUnavailable(e.into()))?;
        let input_size = classifier.input_size();
        if input_size == 0 {
            return Err(ScanError::ClassifierUnavailable(
                "classifier reports an empty input size".into(),
            ));
        }
        if input_size != config.model_input_size {
            tracing::warn!(
                configured = config.model_input_size,
                classifier = input_size,
                "classifier input size overrides configuration"
            );
        }

        let cache = ResultCache::new();
        let ledger = CodeLedger::new();
        let stats = Arc::new(ScanStats::default());
        let latest_sequence = Arc::new(AtomicU64::new(0));
        let cycle = Arc::new(DetectionCycle {
            classifier,
            labels: self.labels,
            decoder: Decoder::new(self.reader, config.enhance.clone()),
            cache: cache.clone(),
            tracker: self.tracker.clone(),
            upload: self.upload,
            ledger: ledger.clone(),
            confidence_threshold: config.confidence_threshold,
            region_padding: config.region_padding,
            max_detections: config.max_detections,
        });

        let (jobs, queue) = mpsc::channel(config.queue_depth);
        let (stop, stopped) = watch::channel(false);
        let dispatcher = runtime.spawn(dispatch(
            queue,
            cycle,
            Arc::new(Semaphore::new(config.max_in_flight)),
            stats.clone(),
            stopped.clone(),
        ));
        let evictor = runtime.spawn(evict_periodically(
            cache.clone(),
            self.tracker,
            config.eviction_period(),
            latest_sequence.clone(),
            stats.clone(),
            stopped,
        ));

        tracing::info!(
            input_size,
            max_in_flight = config.max_in_flight,
            queue_depth = config.queue_depth,
            eviction_ms = config.eviction_period_ms,
            "scanner started"
        );

        Ok(Scanner {
            jobs,
            stop,
            dispatcher,
            evictor,
            geometry: SessionGeometry::new(input_size),
            next_sequence: AtomicU64::new(0),
            latest_sequence,
            cache,
            ledger,
            stats,
        })
    }
}

/// A running scanner session.
pub struct Scanner {
    jobs: mpsc::Sender<Job>,
    stop: watch::Sender<bool>,
    dispatcher: JoinHandle<()>,
    evictor: JoinHandle<()>,
    geometry: SessionGeometry,
    next_sequence: AtomicU64,
    latest_sequence: Arc<AtomicU64>,
    cache: ResultCache,
    ledger: CodeLedger,
    stats: Arc<ScanStats>,
}

impl Scanner {
    pub fn builder(config: ScannerConfig) -> ScannerBuilder {
        ScannerBuilder::new(config)
    }

    /// Hand a frame to the scanner without waiting for any processing.
    pub fn submit(&self, frame: Frame) -> Result<FrameDisposition> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.latest_sequence.fetch_max(sequence, Ordering::Relaxed);
        ScanStats::bump(&self.stats.frames_received, 1);

        let pair = self
            .geometry
            .transform_for(frame.width(), frame.height(), frame.rotation())?;
        let job = Job {
            frame: frame.with_sequence(sequence),
            pair,
        };
        match self.jobs.try_send(job) {
            Ok(()) => Ok(FrameDisposition::Queued { sequence }),
            Err(mpsc::error::TrySendError::Full(_)) => {
                ScanStats::bump(&self.stats.frames_skipped, 1);
                tracing::trace!(sequence, "workers busy, frame skipped");
                Ok(FrameDisposition::Skipped { sequence })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ScanError::Stopped),
        }
    }

    pub fn snapshot(&self) -> Vec<Recognition> {
        self.cache.snapshot()
    }

    pub fn ledger(&self) -> &CodeLedger {
        &self.ledger
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn geometry(&self) -> &SessionGeometry {
        &self.geometry
    }

    /// Stop intake, let queued and running cycles finish, stop the timer.
    pub async fn shutdown(self) -> StatsSnapshot {
        let _ = self.stop.send(true);
        drop(self.jobs);
        if let Err(err) = self.dispatcher.await {
            tracing::error!(error = %err, "dispatcher task failed");
        }
        if let Err(err) = self.evictor.await {
            tracing::error!(error = %err, "eviction task failed");
        }
        let stats = self.stats.snapshot();
        tracing::info!(?stats, "scanner stopped");
        stats
    }
}

async fn dispatch(
    mut queue: mpsc::Receiver<Job>,
    cycle: Arc<DetectionCycle>,
    permits: Arc<Semaphore>,
    stats: Arc<ScanStats>,
    mut stopped: watch::Receiver<bool>,
) {
    let mut running = JoinSet::new();
    loop {
        tokio::select! {
            _ = stopped.changed() => break,
            Some(done) = running.join_next(), if !running.is_empty() => stats.record_cycle(done),
            job = queue.recv() => {
                let Some(job) = job else { break };
                let Ok(permit) = permits.clone().acquire_owned().await else { break };
                launch(&mut running, &cycle, job, permit);
            }
        }
    }

    // Whatever was already queued still runs.
    queue.close();
    while let Some(job) = queue.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else { break };
        launch(&mut running, &cycle, job, permit);
    }
    while let Some(done) = running.join_next().await {
        stats.record_cycle(done);
    }
}

/// Run one cycle on the blocking pool, holding `permit` until it returns.
fn launch(
    running: &mut JoinSet<Result<CycleReport>>,
    cycle: &Arc<DetectionCycle>,
    job: Job,
    permit: OwnedSemaphorePermit,
) {
    let cycle = cycle.clone();
    running.spawn_blocking(move || {
        let _permit = permit;
        cycle.run(&job.frame, &job.pair)
    });
}

async fn evict_periodically(
    cache: ResultCache,
    tracker: Arc<dyn Tracker>,
    period: time::Duration,
    latest_sequence: Arc<AtomicU64>,
    stats: Arc<ScanStats>,
    mut stopped: watch::Receiver<bool>,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = stopped.changed() => break,
            _ = ticker.tick() => {
                let removed = cache.evict_all();
                ScanStats::bump(&stats.evictions, 1);
                tracing::debug!(removed, "evicted result cache");
                tracker.track(Flush {
                    timestamp: latest_sequence.load(Ordering::Relaxed),
                    recognitions: Vec::new(),
                    cause: FlushCause::Eviction,
                });
            }
        }
    }
}
