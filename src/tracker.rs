//! Where results go once a cycle or an eviction is done.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::models::Recognition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushCause {
    /// A detection cycle finished
    Cycle,
    /// The eviction timer cleared the cache
    Eviction,
}

/// One hand-off of the cache contents to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Flush {
    /// Sequence number of the frame the snapshot belongs to
    pub timestamp: u64,
    pub recognitions: Vec<Recognition>,
    pub cause: FlushCause,
}

/// Consumer of cache snapshots (overlay renderer, logger, test recorder).
///
/// Called from worker threads and the timer task; must not block.
pub trait Tracker: Send + Sync {
    fn track(&self, flush: Flush);
}

impl<F> Tracker for F
where
    F: Fn(Flush) + Send + Sync,
{
    fn track(&self, flush: Flush) {
        self(flush)
    }
}

/// Forwards every flush into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelTracker {
    sender: mpsc::UnboundedSender<Flush>,
}

impl ChannelTracker {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Flush>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Tracker for ChannelTracker {
    fn track(&self, flush: Flush) {
        // A closed receiver just means nobody is watching anymore.
        let _ = self.sender.send(flush);
    }
}

/// Receives values decoded for the first time this session.
pub trait UploadSink: Send + Sync {
    fn submit(&self, values: Vec<String>);
}

impl<F> UploadSink for F
where
    F: Fn(Vec<String>) + Send + Sync,
{
    fn submit(&self, values: Vec<String>) {
        self(values)
    }
}

/// Every distinct value decoded this session, in first-seen order.
///
/// Unlike the result cache this is never evicted.
#[derive(Debug, Clone, Default)]
pub struct CodeLedger {
    inner: Arc<Mutex<LedgerState>>,
}

#[derive(Debug, Default)]
struct LedgerState {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl CodeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `value` had not been recorded before.
    pub fn record(&self, value: &str) -> bool {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if state.seen.contains(value) {
            return false;
        }
        state.seen.insert(value.to_string());
        state.order.push(value.to_string());
        true
    }

    pub fn codes(&self) -> Vec<String> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).order.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
