//! In-memory histogram of scan-cycle durations.

use std::sync::Mutex;
use std::time::Duration;

/// Scan loop records, API reads. Values stored in milliseconds.
pub struct LatencyStats {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

impl LatencyStats {
    /// Tracks 1ms to 1h, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 3_600_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, d: Duration) {
        let ms = (d.as_millis().min(u128::from(u64::MAX)) as u64).max(1);
        if let Ok(mut h) = self.inner.lock() {
            // values above the upper bound are clamped by saturating_record
            h.saturating_record(ms);
        }
    }

    /// (p50_ms, p95_ms, p99_ms, max_ms). None if no samples.
    pub fn percentiles(&self) -> Option<(u64, u64, u64, u64)> {
        let h = self.inner.lock().ok()?;
        if h.len() == 0 {
            return None;
        }
        Some((
            h.value_at_quantile(0.5),
            h.value_at_quantile(0.95),
            h.value_at_quantile(0.99),
            h.max(),
        ))
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().map(|h| h.len()).unwrap_or(0)
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_no_percentiles() {
        assert_eq!(LatencyStats::new().percentiles(), None);
    }

    #[test]
    fn records_cycle_durations() {
        let stats = LatencyStats::new();
        for ms in [100, 200, 300, 400] {
            stats.record(Duration::from_millis(ms));
        }
        stats.record(Duration::ZERO);
        assert_eq!(stats.len(), 5);
        let (p50, _, _, max) = stats.percentiles().unwrap();
        assert!((199..=201).contains(&p50));
        assert!((399..=401).contains(&max));
    }
}
