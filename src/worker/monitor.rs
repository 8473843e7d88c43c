//! Pipeline Monitor
//!
//! Alert checks over the record store. They catch what the workers cannot
//! see from inside one pass:
//!
//! - `payment_verified` records nobody picks up (transfer worker down)
//! - a high share of failed transfers in the last hour
//! - repeated failures caused by a missing settlement wallet
//!
//! Checks only read. Alerts are logged and returned in the report.

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::MonitorConfig;
use crate::protocol::client::WALLET_NOT_CONFIGURED;
use crate::swap::{RecordFilter, SwapError, SwapId, SwapStatus, TransactionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    StuckTransactions,
    HighFailureRate,
    WalletConfigFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub severity: Severity,
    pub kind: AlertKind,
    pub count: u64,
    pub message: String,
    /// Affected swaps, at most `max_listed_ids`
    pub swap_ids: Vec<SwapId>,
    pub hints: &'static [&'static str],
}

/// Records created in the last 24 hours
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DailySummary {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub success_rate_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitoringReport {
    pub generated_at: DateTime<Utc>,
    pub alerts: Vec<Alert>,
    pub summary: DailySummary,
    pub stuck_transactions: u64,
    pub wallet_configured: bool,
    pub highest_severity: Option<Severity>,
}

impl MonitoringReport {
    /// Healthy while no critical alert is raised
    pub fn is_healthy(&self) -> bool {
        self.highest_severity != Some(Severity::Critical)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub generated_at: DateTime<Utc>,
    pub wallet_configured: bool,
    pub stuck_transactions: u64,
    pub last_24h_success_rate: Decimal,
}

const STUCK_HINTS: &[&str] = &[
    "Check the settlement wallet configuration",
    "Verify the transfer worker is running",
    "Check connectivity to the Circular Protocol gateway",
    "Review recent CIRX transfer failures",
];

const FAILURE_RATE_HINTS: &[&str] = &[
    "Check the settlement wallet CIRX balance",
    "Verify Circular Protocol network connectivity",
    "Review transfer error patterns in logs",
];

const WALLET_HINTS: &[&str] = &[
    "Check the wallet key environment variables",
    "No CIRX transfer can complete until a wallet is loaded",
];

fn percent(part: u64, total: u64) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(total))
        .round_dp(2)
        .normalize()
}

pub struct TransactionMonitor {
    store: Arc<dyn TransactionStore>,
    config: MonitorConfig,
    wallet_configured: bool,
}

impl TransactionMonitor {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        config: &MonitorConfig,
        wallet_configured: bool,
    ) -> Self {
        Self {
            store,
            config: config.clone(),
            wallet_configured,
        }
    }

    fn stuck_filter(&self, now: DateTime<Utc>) -> RecordFilter {
        let cutoff = now - TimeDelta::minutes(self.config.stuck_payment_verified_mins);
        RecordFilter::status(SwapStatus::PaymentVerified, self.config.max_listed_ids)
            .updated_before(cutoff)
    }

    /// `payment_verified` records untouched for longer than the threshold.
    pub async fn check_stuck_transactions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, SwapError> {
        let filter = self.stuck_filter(now);
        let count = self.store.count_matching(&filter).await?;
        if count == 0 {
            return Ok(None);
        }

        let swap_ids = self.store.find(&filter).await?.iter().map(|r| r.id).collect();
        let mins = self.config.stuck_payment_verified_mins;
        error!(count, threshold_mins = mins, "Stuck transactions detected");
        Ok(Some(Alert {
            severity: Severity::Critical,
            kind: AlertKind::StuckTransactions,
            count,
            message: format!(
                "{} transactions stuck in payment_verified for over {} minutes",
                count, mins
            ),
            swap_ids,
            hints: STUCK_HINTS,
        }))
    }

    /// Share of failed transfers among records created in the last hour.
    pub async fn check_transfer_failure_rate(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, SwapError> {
        let since = now - TimeDelta::hours(1);
        let mut failed = 0;
        let mut total = 0;
        for status in [
            SwapStatus::FailedCirxTransfer,
            SwapStatus::Completed,
            SwapStatus::CirxTransferPending,
        ] {
            let n = self
                .store
                .count_matching(&RecordFilter::status(status, 0).created_since(since))
                .await?;
            if status == SwapStatus::FailedCirxTransfer {
                failed = n;
            }
            total += n;
        }
        if total == 0 {
            return Ok(None);
        }

        let rate = percent(failed, total);
        if rate < self.config.failed_transfer_percent {
            debug!(rate = %rate, failed, total, "Transfer failure rate within threshold");
            return Ok(None);
        }

        warn!(
            rate = %rate,
            failed,
            total,
            threshold = %self.config.failed_transfer_percent,
            "High CIRX transfer failure rate"
        );
        Ok(Some(Alert {
            severity: Severity::High,
            kind: AlertKind::HighFailureRate,
            count: failed,
            message: format!(
                "CIRX transfer failure rate is {}% ({}/{}) in the last hour",
                rate, failed, total
            ),
            swap_ids: Vec::new(),
            hints: FAILURE_RATE_HINTS,
        }))
    }

    /// Recent transfers failed because no settlement wallet was loaded.
    pub async fn check_wallet_configuration_failures(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, SwapError> {
        let window = self.config.wallet_failure_window_mins;
        let filter = RecordFilter::status(SwapStatus::FailedCirxTransfer, self.config.max_listed_ids)
            .created_since(now - TimeDelta::minutes(window))
            .reason_contains(WALLET_NOT_CONFIGURED);
        let count = self.store.count_matching(&filter).await?;
        if count == 0 || count < self.config.wallet_config_failure_count {
            return Ok(None);
        }

        let swap_ids = self.store.find(&filter).await?.iter().map(|r| r.id).collect();
        error!(count, window_mins = window, "CIRX wallet configuration failure");
        Ok(Some(Alert {
            severity: Severity::Critical,
            kind: AlertKind::WalletConfigFailure,
            count,
            message: format!(
                "{} CIRX wallet configuration failures in {} minutes",
                count, window
            ),
            swap_ids,
            hints: WALLET_HINTS,
        }))
    }

    async fn daily_summary(&self, now: DateTime<Utc>) -> Result<DailySummary, SwapError> {
        let since = now - TimeDelta::hours(24);
        let mut summary = DailySummary::default();
        for status in SwapStatus::ALL {
            let n = self
                .store
                .count_matching(&RecordFilter::status(status, 0).created_since(since))
                .await?;
            summary.total += n;
            match status {
                SwapStatus::Completed => summary.completed += n,
                SwapStatus::FailedPaymentVerification | SwapStatus::FailedCirxTransfer => {
                    summary.failed += n
                }
                _ => {}
            }
        }
        summary.success_rate_percent = percent(summary.completed, summary.total);
        Ok(summary)
    }

    /// Run every check and summarize the last 24 hours.
    pub async fn generate_report(&self) -> Result<MonitoringReport, SwapError> {
        let now = Utc::now();
        let alerts: Vec<Alert> = [
            self.check_stuck_transactions(now).await?,
            self.check_transfer_failure_rate(now).await?,
            self.check_wallet_configuration_failures(now).await?,
        ]
        .into_iter()
        .flatten()
        .collect();

        let summary = self.daily_summary(now).await?;
        let stuck_transactions = self.store.count_matching(&self.stuck_filter(now)).await?;
        let highest_severity = alerts.iter().map(|a| a.severity).max();

        Ok(MonitoringReport {
            generated_at: now,
            alerts,
            summary,
            stuck_transactions,
            wallet_configured: self.wallet_configured,
            highest_severity,
        })
    }

    pub async fn is_system_healthy(&self) -> Result<bool, SwapError> {
        Ok(self.generate_report().await?.is_healthy())
    }

    pub async fn health_status(&self) -> Result<HealthStatus, SwapError> {
        let report = self.generate_report().await?;
        Ok(HealthStatus {
            status: if report.is_healthy() {
                "healthy"
            } else {
                "unhealthy"
            },
            generated_at: report.generated_at,
            wallet_configured: report.wallet_configured,
            stuck_transactions: report.stuck_transactions,
            last_24h_success_rate: report.summary.success_rate_percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::InMemoryTransactionStore;
    use crate::swap::TransactionRecord;
    use crate::swap::types::fixtures::{deposit_hash, new_swap};

    struct Fixture {
        store: Arc<InMemoryTransactionStore>,
        monitor: TransactionMonitor,
        next: u64,
    }

    impl Fixture {
        fn new(wallet_configured: bool) -> Self {
            let store = Arc::new(InMemoryTransactionStore::new());
            let monitor =
                TransactionMonitor::new(store.clone(), &MonitorConfig::default(), wallet_configured);
            Self {
                store,
                monitor,
                next: 0,
            }
        }

        /// Record created at `at`, driven to `status`
        fn seed(&mut self, status: SwapStatus, at: DateTime<Utc>, reason: &str) -> TransactionRecord {
            self.next += 1;
            let mut r = TransactionRecord::new(new_swap(&deposit_hash(self.next)), at);
            match status {
                SwapStatus::PendingPaymentVerification => {}
                SwapStatus::FailedPaymentVerification => r.mark_failed(reason, at).unwrap(),
                _ => {
                    r.mark_payment_verified(at).unwrap();
                    if status != SwapStatus::PaymentVerified {
                        r.claim_for_transfer(at).unwrap();
                    }
                    match status {
                        SwapStatus::FailedCirxTransfer => r.mark_failed(reason, at).unwrap(),
                        SwapStatus::CirxTransferInitiated | SwapStatus::Completed => {
                            r.mark_transfer_initiated("0xfeed", at).unwrap();
                            if status == SwapStatus::Completed {
                                r.mark_completed(at).unwrap();
                            }
                        }
                        _ => {}
                    }
                }
            }
            self.store.put(r.clone());
            r
        }
    }

    #[tokio::test]
    async fn test_quiet_store_is_healthy() {
        let f = Fixture::new(true);
        let report = f.monitor.generate_report().await.unwrap();
        assert!(report.alerts.is_empty());
        assert!(report.is_healthy());
        assert_eq!(report.highest_severity, None);
        assert_eq!(report.summary, DailySummary::default());

        let health = f.monitor.health_status().await.unwrap();
        assert_eq!(health.status, "healthy");
        assert!(health.wallet_configured);
    }

    #[tokio::test]
    async fn test_stale_payment_verified_is_critical() {
        let mut f = Fixture::new(true);
        let now = Utc::now();
        let stale = f.seed(SwapStatus::PaymentVerified, now - TimeDelta::minutes(45), "");
        f.seed(SwapStatus::PaymentVerified, now - TimeDelta::minutes(5), "");

        let alert = f.monitor.check_stuck_transactions(now).await.unwrap().unwrap();
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.count, 1);
        assert_eq!(alert.swap_ids, vec![stale.id]);
        assert_eq!(
            alert.message,
            "1 transactions stuck in payment_verified for over 30 minutes"
        );

        assert!(!f.monitor.is_system_healthy().await.unwrap());
        let health = f.monitor.health_status().await.unwrap();
        assert_eq!(health.status, "unhealthy");
        assert_eq!(health.stuck_transactions, 1);
    }

    #[tokio::test]
    async fn test_failure_rate_threshold() {
        let mut f = Fixture::new(true);
        let now = Utc::now();
        for _ in 0..3 {
            f.seed(SwapStatus::Completed, now, "");
        }
        f.seed(SwapStatus::FailedCirxTransfer, now, "CIRX transfer failed after 4 attempts: busy");
        // Outside the one-hour window
        f.seed(
            SwapStatus::FailedCirxTransfer,
            now - TimeDelta::hours(2),
            "CIRX transfer failed after 4 attempts: busy",
        );

        let alert = f
            .monitor
            .check_transfer_failure_rate(now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.count, 1);
        assert_eq!(
            alert.message,
            "CIRX transfer failure rate is 25% (1/4) in the last hour"
        );

        f.seed(SwapStatus::Completed, now, "");
        assert!(
            f.monitor
                .check_transfer_failure_rate(now)
                .await
                .unwrap()
                .is_none()
        );

        // High alone does not make the system unhealthy
        let report = f.monitor.generate_report().await.unwrap();
        assert!(report.is_healthy());
    }

    #[tokio::test]
    async fn test_wallet_failures_need_the_threshold() {
        let mut f = Fixture::new(false);
        let now = Utc::now();
        let reason = format!(
            "CIRX transfer failed permanently: Cryptographic error: {}",
            WALLET_NOT_CONFIGURED
        );
        f.seed(SwapStatus::FailedCirxTransfer, now, &reason);
        f.seed(SwapStatus::FailedCirxTransfer, now, &reason);
        f.seed(SwapStatus::FailedCirxTransfer, now, "CIRX transfer failed after 4 attempts: busy");
        assert!(
            f.monitor
                .check_wallet_configuration_failures(now)
                .await
                .unwrap()
                .is_none()
        );

        f.seed(SwapStatus::FailedCirxTransfer, now, &reason);
        let alert = f
            .monitor
            .check_wallet_configuration_failures(now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alert.kind, AlertKind::WalletConfigFailure);
        assert_eq!(alert.count, 3);
        assert_eq!(alert.swap_ids.len(), 3);

        let report = f.monitor.generate_report().await.unwrap();
        assert_eq!(report.highest_severity, Some(Severity::Critical));
        assert!(!report.wallet_configured);
    }

    #[tokio::test]
    async fn test_daily_summary() {
        let mut f = Fixture::new(true);
        let now = Utc::now();
        f.seed(SwapStatus::Completed, now, "");
        f.seed(SwapStatus::Completed, now, "");
        f.seed(SwapStatus::FailedPaymentVerification, now, "gone");
        f.seed(SwapStatus::PendingPaymentVerification, now, "");
        f.seed(SwapStatus::Completed, now - TimeDelta::hours(30), "");

        let report = f.monitor.generate_report().await.unwrap();
        assert_eq!(
            report.summary,
            DailySummary {
                total: 4,
                completed: 2,
                failed: 1,
                success_rate_percent: Decimal::from(50),
            }
        );
    }
}
