//! Shared health state for the /health endpoint.
//! Updated by the scan loop, read by the API.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

use serde::Serialize;

/// Where the scan loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Scanning,
    Filtering,
    Dispatching,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Phase::Scanning,
            2 => Phase::Filtering,
            3 => Phase::Dispatching,
            _ => Phase::Idle,
        }
    }
}

/// Shared health metrics.
#[derive(Default)]
pub struct HealthState {
    phase: AtomicU8,
    cycles_ok: AtomicU64,
    cycles_failed: AtomicU64,
    /// Unix seconds of the last completed scan (0 = none).
    last_scan_at: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Relaxed);
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Relaxed))
    }

    pub fn cycle_ok(&self, finished_at_secs: u64) {
        self.cycles_ok.fetch_add(1, Ordering::Relaxed);
        self.last_scan_at.store(finished_at_secs, Ordering::Relaxed);
    }

    pub fn cycle_failed(&self, err: String) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        self.set_phase(Phase::Idle);
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(err);
        }
    }

    pub fn cycles_ok(&self) -> u64 {
        self.cycles_ok.load(Ordering::Relaxed)
    }

    pub fn cycles_failed(&self) -> u64 {
        self.cycles_failed.load(Ordering::Relaxed)
    }

    pub fn last_scan_at(&self) -> u64 {
        self.last_scan_at.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }
}
