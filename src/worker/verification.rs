//! Payment Verification Worker
//!
//! Drives `pending_payment_verification` records to `payment_verified` or
//! `failed_payment_verification`.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::report::{RecordOutcome, VerificationBatchReport, VerificationStatistics};
use super::retry::RetryPolicy;
use crate::config::VerificationWorkerConfig;
use crate::services::PaymentVerificationService;
use crate::swap::{RecordFilter, SwapError, SwapStatus, TransactionRecord, TransactionStore};

/// Why a verification attempt did not succeed
enum AttemptFailure {
    /// The service answered with a negative verdict
    Rejected(String),
    /// The service errored or timed out
    Exception(String),
}

pub struct PaymentVerificationWorker {
    store: Arc<dyn TransactionStore>,
    verifier: Arc<dyn PaymentVerificationService>,
    policy: RetryPolicy,
    batch_size: usize,
    retry_batch_size: usize,
    call_timeout: Duration,
}

impl PaymentVerificationWorker {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        verifier: Arc<dyn PaymentVerificationService>,
        config: &VerificationWorkerConfig,
    ) -> Self {
        Self {
            store,
            verifier,
            policy: RetryPolicy::new(config.max_retries, config.retry_delay_secs),
            batch_size: config.batch_size,
            retry_batch_size: config.retry_batch_size,
            call_timeout: config.call_timeout(),
        }
    }

    /// Create with default configuration
    pub fn with_defaults(
        store: Arc<dyn TransactionStore>,
        verifier: Arc<dyn PaymentVerificationService>,
    ) -> Self {
        Self::new(store, verifier, &VerificationWorkerConfig::default())
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn set_max_retries(&self, max_retries: i64) {
        self.policy.set_max_retries(max_retries);
    }

    pub fn set_retry_delay(&self, retry_delay_secs: i64) {
        self.policy.set_retry_delay(retry_delay_secs);
    }

    /// Verify every due `pending_payment_verification` record.
    pub async fn process_pending_transactions(
        &self,
    ) -> Result<VerificationBatchReport, SwapError> {
        let filter = RecordFilter::status(SwapStatus::PendingPaymentVerification, self.batch_size)
            .due_before(self.policy.due_cutoff(Utc::now()));
        self.run_batch(filter, "pending").await
    }

    /// Same as [`Self::process_pending_transactions`], limited to records
    /// that already failed at least once.
    pub async fn process_retry_transactions(&self) -> Result<VerificationBatchReport, SwapError> {
        let filter =
            RecordFilter::status(SwapStatus::PendingPaymentVerification, self.retry_batch_size)
                .retries_only()
                .due_before(self.policy.due_cutoff(Utc::now()));
        self.run_batch(filter, "retry").await
    }

    async fn run_batch(
        &self,
        filter: RecordFilter,
        pass: &'static str,
    ) -> Result<VerificationBatchReport, SwapError> {
        let mut report = VerificationBatchReport::default();
        let records = self.store.find(&filter).await.inspect_err(|e| {
            error!(pass, error = %e, "Verification scan failed");
        })?;

        if records.is_empty() {
            debug!(pass, "No transactions awaiting verification");
            return Ok(report);
        }

        let now = Utc::now();
        for record in records
            .iter()
            .filter(|r| self.policy.is_eligible(r, now))
        {
            match self.process_transaction(record).await {
                Ok(outcome) => report.record(record.id, &outcome),
                Err(e @ SwapError::Database(_)) => {
                    error!(swap_id = %record.id, error = %e, "Verification batch aborted");
                    return Err(e);
                }
                Err(e) => {
                    error!(swap_id = %record.id, error = %e, "Verification bookkeeping failed");
                    report.absorb(record.id, &e.to_string());
                }
            }
        }

        info!(
            pass,
            processed = report.processed,
            verified = report.verified,
            retried = report.retried,
            failed = report.failed,
            "Verification pass finished"
        );
        Ok(report)
    }

    /// One verification attempt for one record.
    ///
    /// Only store failures are returned as `Err`; service errors and
    /// timeouts are booked against the record's retry budget.
    pub async fn process_transaction(
        &self,
        record: &TransactionRecord,
    ) -> Result<RecordOutcome, SwapError> {
        if record.swap_status != SwapStatus::PendingPaymentVerification {
            return Ok(RecordOutcome::Superseded);
        }

        let attempt = tokio::time::timeout(self.call_timeout, self.verifier.verify(record)).await;
        let failure = match attempt {
            Ok(Ok(verdict)) if verdict.is_valid => {
                let mut next = record.clone();
                next.mark_payment_verified(Utc::now())?;
                if !self
                    .store
                    .compare_and_update(SwapStatus::PendingPaymentVerification, &mut next)
                    .await?
                {
                    debug!(swap_id = %record.id, "Another worker already transitioned");
                    return Ok(RecordOutcome::Superseded);
                }
                info!(
                    swap_id = %record.id,
                    payment_tx_id = %record.payment_tx_id,
                    verifier = self.verifier.name(),
                    "Payment verified"
                );
                return Ok(RecordOutcome::Verified);
            }
            Ok(Ok(verdict)) => AttemptFailure::Rejected(
                verdict
                    .reason
                    .unwrap_or_else(|| "Payment verification failed".to_string()),
            ),
            Ok(Err(e)) => AttemptFailure::Exception(e.to_string()),
            Err(_) => AttemptFailure::Exception(format!(
                "verification timed out after {}s",
                self.call_timeout.as_secs()
            )),
        };

        self.book_failure(record, failure).await
    }

    async fn book_failure(
        &self,
        record: &TransactionRecord,
        failure: AttemptFailure,
    ) -> Result<RecordOutcome, SwapError> {
        let now = Utc::now();
        let mut next = record.clone();
        let attempts = record.retry_count + 1;

        let outcome = if self.policy.should_retry(record) {
            let message = match &failure {
                AttemptFailure::Rejected(m) | AttemptFailure::Exception(m) => m.clone(),
            };
            next.book_retry(now)?;
            RecordOutcome::Retried(message)
        } else {
            let reason = match failure {
                AttemptFailure::Rejected(m) => {
                    format!("Payment verification failed after {} attempts: {}", attempts, m)
                }
                AttemptFailure::Exception(m) => {
                    format!("Worker exception after {} attempts: {}", attempts, m)
                }
            };
            next.mark_failed(reason.clone(), now)?;
            RecordOutcome::Failed(reason)
        };

        if !self
            .store
            .compare_and_update(SwapStatus::PendingPaymentVerification, &mut next)
            .await?
        {
            debug!(swap_id = %record.id, "Another worker already transitioned");
            return Ok(RecordOutcome::Superseded);
        }

        match &outcome {
            RecordOutcome::Retried(e) => warn!(
                swap_id = %record.id,
                retry_count = next.retry_count,
                max_retries = self.policy.max_retries(),
                error = %e,
                "Payment verification failed, will retry"
            ),
            RecordOutcome::Failed(reason) => warn!(
                swap_id = %record.id,
                reason = %reason,
                "Payment verification failed permanently"
            ),
            _ => {}
        }
        Ok(outcome)
    }

    pub async fn statistics(&self) -> Result<VerificationStatistics, SwapError> {
        Ok(VerificationStatistics {
            pending_verification: self
                .store
                .count(SwapStatus::PendingPaymentVerification, false)
                .await?,
            pending_retries: self
                .store
                .count(SwapStatus::PendingPaymentVerification, true)
                .await?,
            failed_verification: self
                .store
                .count(SwapStatus::FailedPaymentVerification, false)
                .await?,
            payment_verified: self.store.count(SwapStatus::PaymentVerified, false).await?,
        })
    }
}
