use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::Recognition;

/// Latest recognition per decoded value, shared by every worker.
///
/// Cloning gives another handle to the same map. Every operation takes the one
/// lock, so snapshots never observe a half-applied update.
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    inner: Arc<Mutex<HashMap<String, Recognition>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Recognition>> {
        // Writers never leave the map half-updated, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the entry for `recognition.id`.
    pub fn upsert(&self, recognition: Recognition) {
        self.lock().insert(recognition.id.clone(), recognition);
    }

    pub fn snapshot(&self) -> Vec<Recognition> {
        self.lock().values().cloned().collect()
    }

    /// Drop everything; returns how many entries were removed.
    pub fn evict_all(&self) -> usize {
        let mut map = self.lock();
        let removed = map.len();
        map.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
