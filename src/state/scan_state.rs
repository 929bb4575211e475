use std::sync::{Arc, Mutex, MutexGuard};

use crate::alerts::{self, AlertedSet};
use crate::types::{Opportunity, ScanMetadata, ScanResult};

/// Last completed scan: bookkeeping plus the ranked result it produced.
#[derive(Debug, Clone)]
pub struct ScanSnapshot {
    pub metadata: ScanMetadata,
    pub result: Arc<ScanResult>,
}

#[derive(Default)]
struct Inner {
    alerted: AlertedSet,
    last: Option<ScanSnapshot>,
}

/// State owned by the scan loop and read by the API.
///
/// The loop is the only caller of `mark_alerted`, and it runs one cycle at a
/// time, so a preview followed by a mark cannot interleave with another
/// cycle's.
#[derive(Default)]
pub struct ScanState {
    inner: Mutex<Inner>,
}

impl ScanState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // A panicking cycle must not take the state down with it.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn preview_alerts(&self, result: &ScanResult, threshold: f64, max_batch: usize) -> Vec<Opportunity> {
        alerts::preview(result, &self.lock().alerted, threshold, max_batch)
    }

    pub fn mark_alerted(&self, batch: &[Opportunity]) {
        alerts::mark(&mut self.lock().alerted, batch);
    }

    pub fn alerted_count(&self) -> usize {
        self.lock().alerted.len()
    }

    pub fn is_alerted(&self, id: &str) -> bool {
        self.lock().alerted.contains(id)
    }

    pub fn record(&self, snapshot: ScanSnapshot) {
        self.lock().last = Some(snapshot);
    }

    pub fn last(&self) -> Option<ScanSnapshot> {
        self.lock().last.clone()
    }
}
