use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};

use crate::aggregator::aggregate;
use crate::api::health::{HealthState, Phase};
use crate::api::latency::LatencyStats;
use crate::config::{Config, ManualScanPolicy};
use crate::error::{AppError, Result};
use crate::notifier::{dispatch, DispatchReport, Notifier};
use crate::providers::{Provider, ScanContext};
use crate::state::{ScanSnapshot, ScanState, Subscribers};
use crate::types::{ScanMetadata, Trigger};

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub alert_threshold: f64,
    pub max_alerts_per_cycle: usize,
    pub manual_policy: ManualScanPolicy,
    pub scan_interval: Duration,
    pub idle_recheck: Duration,
}

impl ScanSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            alert_threshold: cfg.alert_threshold,
            max_alerts_per_cycle: cfg.max_alerts_per_cycle,
            manual_policy: cfg.manual_scan_policy,
            scan_interval: cfg.scan_interval,
            idle_recheck: cfg.idle_recheck,
        }
    }
}

/// Handles shared between the scan loop (writer) and the API (reader).
#[derive(Clone)]
pub struct Shared {
    pub state: Arc<ScanState>,
    pub subscribers: Arc<Subscribers>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

impl Shared {
    pub fn new(subscribers: Arc<Subscribers>) -> Self {
        Self {
            state: ScanState::new(),
            subscribers,
            health: Arc::new(HealthState::new()),
            latency: Arc::new(LatencyStats::new()),
        }
    }
}

/// Outcome of one cycle, returned to manual callers and logged for timer ones.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub trigger: Trigger,
    pub evaluated: usize,
    /// Ids above threshold and not yet alerted, in rank order.
    pub alert_ids: Vec<String>,
    /// False when the cycle only reported: a report-only manual scan, or no
    /// subscribers to deliver to. The alerted set is untouched and nothing is sent.
    pub marked: bool,
    pub deliveries_ok: usize,
    pub deliveries_failed: usize,
    pub duration_ms: u64,
}

/// One scan pipeline: aggregate, select, dispatch, record.
#[derive(Clone)]
pub struct ScanEngine {
    providers: Arc<Vec<Arc<dyn Provider>>>,
    notifier: Arc<dyn Notifier>,
    shared: Shared,
    settings: ScanSettings,
}

impl ScanEngine {
    pub fn new(
        providers: Vec<Arc<dyn Provider>>,
        notifier: Arc<dyn Notifier>,
        shared: Shared,
        settings: ScanSettings,
    ) -> Self {
        Self { providers: Arc::new(providers), notifier, shared, settings }
    }

    pub fn shared(&self) -> &Shared {
        &self.shared
    }

    pub async fn run_cycle(&self, trigger: Trigger) -> CycleReport {
        let started = Instant::now();
        let health = &self.shared.health;

        health.set_phase(Phase::Scanning);
        let result = Arc::new(aggregate(&self.providers, &ScanContext::now()).await);

        health.set_phase(Phase::Filtering);
        let wants_alerts = match trigger {
            Trigger::Timer => true,
            Trigger::Manual => self.settings.manual_policy == ManualScanPolicy::Alert,
        };
        let recipients = self.shared.subscribers.recipients();
        // With nobody to deliver to, marking would suppress alerts for good.
        let marked = wants_alerts && !recipients.is_empty();
        let (threshold, max_batch) = (self.settings.alert_threshold, self.settings.max_alerts_per_cycle);
        let alerts = self.shared.state.preview_alerts(&result, threshold, max_batch);

        let mut delivery = DispatchReport::default();
        if marked && !alerts.is_empty() {
            health.set_phase(Phase::Dispatching);
            delivery = dispatch(self.notifier.as_ref(), &recipients, &alerts).await;
            // Marked only after dispatch returns: a panic in delivery leaves
            // the batch eligible for the next cycle.
            self.shared.state.mark_alerted(&alerts);
        }

        let elapsed = started.elapsed();
        let report = CycleReport {
            trigger,
            evaluated: result.len(),
            alert_ids: alerts.iter().map(|o| o.id.clone()).collect(),
            marked,
            deliveries_ok: delivery.delivered,
            deliveries_failed: delivery.failed,
            duration_ms: elapsed.as_millis() as u64,
        };

        let scanned_at = Utc::now();
        self.shared.state.record(ScanSnapshot {
            metadata: ScanMetadata {
                scanned_at,
                evaluated: report.evaluated,
                trigger,
                alerts_selected: report.alert_ids.len(),
                deliveries_ok: report.deliveries_ok,
                deliveries_failed: report.deliveries_failed,
                duration_ms: report.duration_ms,
            },
            result,
        });
        self.shared.latency.record(elapsed);
        health.cycle_ok(scanned_at.timestamp().max(0) as u64);
        health.set_phase(Phase::Idle);

        info!(
            %trigger,
            evaluated = report.evaluated,
            alerts = report.alert_ids.len(),
            marked,
            delivered = report.deliveries_ok,
            failed = report.deliveries_failed,
            duration_ms = report.duration_ms,
            "Scan complete ({trigger}): {} evaluated, {} alerts",
            report.evaluated,
            report.alert_ids.len(),
        );
        report
    }

    /// Runs the cycle on its own task so a panic anywhere inside it surfaces
    /// here as an error instead of killing the caller.
    pub async fn run_isolated(&self, trigger: Trigger) -> Result<CycleReport> {
        let engine = self.clone();
        match tokio::spawn(async move { engine.run_cycle(trigger).await }).await {
            Ok(report) => Ok(report),
            Err(join_err) => {
                let err = AppError::Cycle(format!("{trigger} scan aborted: {join_err}"));
                error!("Scan cycle failed: {err}");
                self.shared.health.cycle_failed(err.to_string());
                Err(err)
            }
        }
    }
}

/// A "scan now" request from the API.
pub struct ManualScan {
    pub reply: oneshot::Sender<Result<CycleReport>>,
}

/// Timer- and manual-driven scan scheduler. The only writer of scan state;
/// manual and timer cycles never overlap.
pub struct ScanLoop {
    engine: ScanEngine,
    manual_rx: mpsc::Receiver<ManualScan>,
}

impl ScanLoop {
    pub fn new(engine: ScanEngine, manual_rx: mpsc::Receiver<ManualScan>) -> Self {
        Self { engine, manual_rx }
    }

    pub async fn run(mut self) {
        let settings = self.engine.settings.clone();
        let mut next_tick = Instant::now();
        let mut manual_open = true;

        loop {
            tokio::select! {
                req = self.manual_rx.recv(), if manual_open => match req {
                    Some(ManualScan { reply }) => {
                        let outcome = self.engine.run_isolated(Trigger::Manual).await;
                        if reply.send(outcome).is_err() {
                            debug!("manual scan requester went away before the reply");
                        }
                    }
                    None => {
                        info!("Manual scan channel closed, continuing on timer only");
                        manual_open = false;
                    }
                },
                _ = sleep_until(next_tick) => {
                    if self.engine.shared.subscribers.is_empty() {
                        debug!("No subscribers, skipping scan");
                        next_tick = Instant::now() + settings.idle_recheck;
                    } else {
                        // errors are already logged and counted
                        let _ = self.engine.run_isolated(Trigger::Timer).await;
                        next_tick = Instant::now() + settings.scan_interval;
                    }
                }
            }
        }
    }
}
