use std::collections::HashSet;

use crate::types::{Opportunity, ScanResult};

/// Ids already delivered during this process lifetime. Only grows.
#[derive(Debug, Default, Clone)]
pub struct AlertedSet {
    ids: HashSet<String>,
}

impl AlertedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn insert(&mut self, id: &str) {
        self.ids.insert(id.to_string());
    }
}

/// Record a batch that has been handed to the notifier.
///
/// Only the batch is marked, so anything `preview` cut at `max_batch` stays
/// eligible for a later cycle.
pub fn mark(alerted: &mut AlertedSet, batch: &[Opportunity]) {
    for o in batch {
        alerted.insert(&o.id);
    }
}

/// Threshold, then dedup, then truncate. Marks nothing; see [`mark`].
pub fn preview(
    result: &ScanResult,
    alerted: &AlertedSet,
    threshold: f64,
    max_batch: usize,
) -> Vec<Opportunity> {
    let mut seen_this_batch: HashSet<&str> = HashSet::new();
    result
        .iter()
        .filter(|o| o.trade_score() >= threshold)
        .filter(|o| !alerted.contains(&o.id))
        // two providers can report the same id in one scan
        .filter(|o| seen_this_batch.insert(o.id.as_str()))
        .take(max_batch)
        .cloned()
        .collect()
}
