//! Settlement Scheduler
//!
//! Long-lived driver for both workers. Each tick runs the verification pass,
//! the transfer pass and, when their intervals have elapsed, the stuck sweep
//! and the monitor. A failing pass is logged and does not stop the others.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::monitor::{MonitoringReport, TransactionMonitor};
use super::report::{StuckSweepReport, TransferBatchReport, VerificationBatchReport};
use super::transfer::CirxTransferWorker;
use super::verification::PaymentVerificationWorker;
use crate::config::SchedulerConfig;
use crate::swap::SwapError;

/// A pass that failed during a tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassFailure {
    pub pass: &'static str,
    pub code: &'static str,
    pub error: String,
}

/// Everything one tick did
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub verification: VerificationBatchReport,
    pub transfer: TransferBatchReport,
    /// `None` when the sweep was not due or failed
    pub stuck: Option<StuckSweepReport>,
    /// `None` when the monitor was not due, not configured or failed
    pub monitoring: Option<MonitoringReport>,
    pub failures: Vec<PassFailure>,
}

impl TickReport {
    fn settle<T>(&mut self, pass: &'static str, result: Result<T, SwapError>) -> Option<T> {
        match result {
            Ok(report) => Some(report),
            Err(e) => {
                error!(pass, error = %e, code = e.code(), "Settlement pass failed");
                self.failures.push(PassFailure {
                    pass,
                    code: e.code(),
                    error: e.to_string(),
                });
                None
            }
        }
    }
}

pub struct SettlementScheduler {
    verification: Arc<PaymentVerificationWorker>,
    transfer: Arc<CirxTransferWorker>,
    monitor: Option<Arc<TransactionMonitor>>,
    config: SchedulerConfig,
    last_stuck_sweep_at: Mutex<Option<Instant>>,
    last_monitor_at: Mutex<Option<Instant>>,
}

/// Claims a periodic slot if `interval` has elapsed since the last one.
fn take_slot(last: &Mutex<Option<Instant>>, interval: Duration, now: Instant) -> bool {
    let mut last = match last.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let due = match *last {
        Some(at) => now.duration_since(at) >= interval,
        None => true,
    };
    if due {
        *last = Some(now);
    }
    due
}

impl SettlementScheduler {
    pub fn new(
        verification: Arc<PaymentVerificationWorker>,
        transfer: Arc<CirxTransferWorker>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            verification,
            transfer,
            monitor: None,
            config,
            last_stuck_sweep_at: Mutex::new(None),
            last_monitor_at: Mutex::new(None),
        }
    }

    /// Run `monitor` every `monitor_interval`
    pub fn with_monitor(mut self, monitor: Arc<TransactionMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn verification_worker(&self) -> &Arc<PaymentVerificationWorker> {
        &self.verification
    }

    pub fn transfer_worker(&self) -> &Arc<CirxTransferWorker> {
        &self.transfer
    }

    fn take_sweep_slot(&self, now: Instant) -> bool {
        take_slot(
            &self.last_stuck_sweep_at,
            self.config.stuck_sweep_interval(),
            now,
        )
    }

    fn take_monitor_slot(&self, now: Instant) -> bool {
        take_slot(&self.last_monitor_at, self.config.monitor_interval(), now)
    }

    /// Run one scheduling cycle.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let verification = self.verification.process_pending_transactions().await;
        report.verification = report
            .settle("verification", verification)
            .unwrap_or_default();

        let transfer = self.transfer.process_ready_transactions().await;
        report.transfer = report.settle("transfer", transfer).unwrap_or_default();

        if self.take_sweep_slot(Instant::now()) {
            let stuck = self.transfer.process_stuck_transactions().await;
            report.stuck = report.settle("stuck_sweep", stuck);
        }

        if let Some(monitor) = &self.monitor {
            if self.take_monitor_slot(Instant::now()) {
                let monitoring = monitor.generate_report().await;
                report.monitoring = report.settle("monitor", monitoring);
            }
        }

        report
    }

    /// Run the scheduler loop
    ///
    /// This method runs forever. Failed passes are logged inside `tick` and
    /// the next tick runs on schedule.
    pub async fn run(&self) -> ! {
        info!(
            tick_interval_secs = self.config.tick_interval().as_secs(),
            stuck_sweep_interval_secs = self.config.stuck_sweep_interval().as_secs(),
            monitor_interval_secs = self.config.monitor_interval().as_secs(),
            "Starting settlement scheduler"
        );

        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let report = self.tick().await;
            if !report.failures.is_empty() {
                warn!(failed_passes = report.failures.len(), "Settlement tick incomplete");
            }
        }
    }
}
