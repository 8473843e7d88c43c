//! CIRX Transfer Worker
//!
//! Moves `payment_verified` records through the transfer stage:
//!
//! ```text
//! payment_verified ──claim──► cirx_transfer_pending ──ok──► cirx_transfer_initiated ──► completed
//!                                  ▲        │
//!                                  └─retry──┤
//!                                           └──exhausted / permanent──► failed_cirx_transfer
//! ```
//!
//! Every step is persisted with a guarded update before the next external
//! call, so a crash leaves the record where the stuck sweep can find it.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::report::{
    BulkTransferReport, RecordOutcome, StuckSweepReport, TransferBatchReport, TransferStatistics,
};
use super::retry::RetryPolicy;
use crate::config::TransferWorkerConfig;
use crate::services::{CirxTransferService, TransferOutcome, TransferServiceError};
use crate::swap::{RecordFilter, SwapError, SwapStatus, TransactionRecord, TransactionStore};

/// Re-reads allowed when recording a transfer whose claim was lost
const ADOPT_ATTEMPTS: usize = 3;

/// Why a transfer attempt did not reach the ledger
#[derive(Debug)]
enum AttemptFailure {
    /// Worth another attempt while budget remains
    Retryable(String),
    /// No later attempt can succeed
    Permanent(String),
}

pub struct CirxTransferWorker {
    store: Arc<dyn TransactionStore>,
    service: Arc<dyn CirxTransferService>,
    policy: RetryPolicy,
    batch_size: usize,
    retry_batch_size: usize,
    stuck_batch_size: usize,
    bulk_batch_size: usize,
    stuck_threshold: TimeDelta,
    call_timeout: Duration,
}

impl CirxTransferWorker {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        service: Arc<dyn CirxTransferService>,
        config: &TransferWorkerConfig,
    ) -> Self {
        Self {
            store,
            service,
            policy: RetryPolicy::new(config.max_retries, config.retry_delay_secs),
            batch_size: config.batch_size,
            retry_batch_size: config.retry_batch_size,
            stuck_batch_size: config.stuck_batch_size,
            bulk_batch_size: config.bulk_batch_size,
            stuck_threshold: TimeDelta::from_std(config.stuck_threshold())
                .unwrap_or(TimeDelta::MAX),
            call_timeout: config.call_timeout(),
        }
    }

    /// Create with default configuration
    pub fn with_defaults(
        store: Arc<dyn TransactionStore>,
        service: Arc<dyn CirxTransferService>,
    ) -> Self {
        Self::new(store, service, &TransferWorkerConfig::default())
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

    fn retry_filter(&self, limit: usize, now: DateTime<Utc>) -> RecordFilter {
        RecordFilter::status(SwapStatus::CirxTransferPending, limit)
            .retries_only()
            .unclaimed()
            .due_before(self.policy.due_cutoff(now))
    }

    /// Fresh `payment_verified` records first, then due retries.
    pub async fn process_ready_transactions(&self) -> Result<TransferBatchReport, SwapError> {
        let mut report = self
            .run_batch(
                RecordFilter::status(SwapStatus::PaymentVerified, self.batch_size),
                "ready",
            )
            .await?;
        report.merge(self.process_retry_transactions().await?);
        Ok(report)
    }

    /// Due `cirx_transfer_pending` records awaiting another attempt.
    pub async fn process_retry_transactions(&self) -> Result<TransferBatchReport, SwapError> {
        let filter = self.retry_filter(self.retry_batch_size, Utc::now());
        self.run_batch(filter, "retry").await
    }

    async fn run_batch(
        &self,
        filter: RecordFilter,
        pass: &'static str,
    ) -> Result<TransferBatchReport, SwapError> {
        let mut report = TransferBatchReport::default();
        let records = self.store.find(&filter).await.inspect_err(|e| {
            error!(pass, error = %e, "Transfer scan failed");
        })?;

        if records.is_empty() {
            debug!(pass, "No transactions ready for transfer");
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
                    error!(swap_id = %record.id, error = %e, "Transfer batch aborted");
                    return Err(e);
                }
                Err(e) => {
                    error!(swap_id = %record.id, error = %e, "Transfer bookkeeping failed");
                    report.absorb(record.id, &e.to_string());
                }
            }
        }

        info!(
            pass,
            processed = report.processed,
            completed = report.completed,
            retried = report.retried,
            failed = report.failed,
            "Transfer pass finished"
        );
        Ok(report)
    }

    /// One transfer attempt for one record.
    ///
    /// Records that are neither `payment_verified` nor awaiting a retry are
    /// left alone and reported as `Superseded`.
    pub async fn process_transaction(
        &self,
        record: &TransactionRecord,
    ) -> Result<RecordOutcome, SwapError> {
        let expected = record.swap_status;
        if expected != SwapStatus::PaymentVerified && !record.is_awaiting_retry() {
            return Ok(RecordOutcome::Superseded);
        }

        let mut claimed = record.clone();
        claimed.claim_for_transfer(Utc::now())?;
        if !self.store.compare_and_update(expected, &mut claimed).await? {
            debug!(swap_id = %record.id, "Another worker claimed the record");
            return Ok(RecordOutcome::Superseded);
        }

        if !self
            .service
            .validate_recipient_address(&claimed.cirx_recipient_address)
        {
            let failure = AttemptFailure::Permanent(format!(
                "Invalid Circular Protocol address format: {}",
                claimed.cirx_recipient_address
            ));
            return self.book_failure(claimed, failure).await;
        }

        let attempt = tokio::time::timeout(self.call_timeout, self.service.transfer(&claimed)).await;
        let failure = match attempt {
            Ok(Ok(TransferOutcome {
                success: true,
                ledger_tx_id: Some(tx_id),
                ..
            })) => return self.record_success(claimed, tx_id).await,
            Ok(Ok(TransferOutcome {
                success: true,
                ledger_tx_id: None,
                ..
            })) => AttemptFailure::Retryable(
                "Transfer reported success without a ledger transaction id".to_string(),
            ),
            Ok(Ok(outcome)) => AttemptFailure::Retryable(
                outcome
                    .error_message
                    .unwrap_or_else(|| "Transfer rejected".to_string()),
            ),
            Ok(Err(e)) => classify(&e),
            Err(_) => AttemptFailure::Retryable(format!(
                "CIRX transfer timed out after {}s",
                self.call_timeout.as_secs()
            )),
        };

        self.book_failure(claimed, failure).await
    }

    async fn record_success(
        &self,
        claimed: TransactionRecord,
        tx_id: String,
    ) -> Result<RecordOutcome, SwapError> {
        let mut next = claimed.clone();
        next.mark_transfer_initiated(tx_id.clone(), Utc::now())?;
        if !self
            .store
            .compare_and_update(SwapStatus::CirxTransferPending, &mut next)
            .await?
        {
            // The sweep released or failed our claim while the call ran
            match self.adopt_accepted_transfer(&claimed, &tx_id).await? {
                Some(adopted) => next = adopted,
                None => return Ok(RecordOutcome::Superseded),
            }
        }
        info!(swap_id = %next.id, tx_id = %tx_id, "CIRX transfer initiated");

        next.mark_completed(Utc::now())?;
        if !self
            .store
            .compare_and_update(SwapStatus::CirxTransferInitiated, &mut next)
            .await?
        {
            debug!(swap_id = %next.id, "Completion already recorded");
            return Ok(RecordOutcome::Completed);
        }
        info!(swap_id = %next.id, tx_id = %tx_id, "Swap completed");
        Ok(RecordOutcome::Completed)
    }

    /// Record a ledger-accepted transfer on a record whose claim was lost.
    ///
    /// The ledger already holds the transfer, so the tx id is written over
    /// whatever `cirx_transfer_pending` state the record is in now. A record
    /// that already left the stage is reported and left alone.
    async fn adopt_accepted_transfer(
        &self,
        claimed: &TransactionRecord,
        tx_id: &str,
    ) -> Result<Option<TransactionRecord>, SwapError> {
        for _ in 0..ADOPT_ATTEMPTS {
            let Some(mut current) = self.store.get(claimed.id).await? else {
                return Ok(None);
            };
            match current.swap_status {
                SwapStatus::CirxTransferPending => {}
                SwapStatus::FailedCirxTransfer => {
                    error!(
                        swap_id = %claimed.id,
                        tx_id,
                        reason = ?current.failure_reason,
                        "Ledger accepted a transfer for a swap already marked failed"
                    );
                    return Ok(None);
                }
                status => {
                    debug!(swap_id = %claimed.id, status = %status, "Transfer already recorded");
                    return Ok(None);
                }
            }

            current.mark_transfer_initiated(tx_id, Utc::now())?;
            if self
                .store
                .compare_and_update(SwapStatus::CirxTransferPending, &mut current)
                .await?
            {
                warn!(
                    swap_id = %claimed.id,
                    tx_id,
                    retry_count = current.retry_count,
                    "Recorded accepted transfer after its claim was released"
                );
                return Ok(Some(current));
            }
        }

        error!(swap_id = %claimed.id, tx_id, "Could not record accepted transfer");
        Err(SwapError::UnrecordedTransfer {
            id: claimed.id.to_string(),
            tx_id: tx_id.to_string(),
        })
    }

    /// Book a failed attempt on a claimed record.
    async fn book_failure(
        &self,
        claimed: TransactionRecord,
        failure: AttemptFailure,
    ) -> Result<RecordOutcome, SwapError> {
        let now = Utc::now();
        let attempts = claimed.retry_count + 1;
        let mut next = claimed;

        let outcome = match failure {
            AttemptFailure::Permanent(e) => {
                let reason = format!("CIRX transfer failed permanently: {}", e);
                next.mark_failed(reason.clone(), now)?;
                RecordOutcome::Failed(reason)
            }
            AttemptFailure::Retryable(e) if self.policy.should_retry(&next) => {
                next.book_retry(now)?;
                RecordOutcome::Retried(e)
            }
            AttemptFailure::Retryable(e) => {
                let reason = format!("CIRX transfer failed after {} attempts: {}", attempts, e);
                next.mark_failed(reason.clone(), now)?;
                RecordOutcome::Failed(reason)
            }
        };

        if !self
            .store
            .compare_and_update(SwapStatus::CirxTransferPending, &mut next)
            .await?
        {
            debug!(swap_id = %next.id, "Claim lost before failure was booked");
            return Ok(RecordOutcome::Superseded);
        }

        match &outcome {
            RecordOutcome::Retried(e) => warn!(
                swap_id = %next.id,
                retry_count = next.retry_count,
                max_retries = self.policy.max_retries(),
                error = %e,
                "CIRX transfer failed, will retry"
            ),
            RecordOutcome::Failed(reason) => warn!(
                swap_id = %next.id,
                reason = %reason,
                "CIRX transfer failed permanently"
            ),
            _ => {}
        }
        Ok(outcome)
    }

    /// Recover records whose attempt started more than the stuck threshold ago.
    ///
    /// Claimed `cirx_transfer_pending` records are released for retry or
    /// failed. `cirx_transfer_initiated` records already hold a ledger tx id
    /// and are finalized without resubmitting.
    pub async fn process_stuck_transactions(&self) -> Result<StuckSweepReport, SwapError> {
        let mut report = StuckSweepReport::default();
        let cutoff = Utc::now()
            .checked_sub_signed(self.stuck_threshold)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        for status in [
            SwapStatus::CirxTransferPending,
            SwapStatus::CirxTransferInitiated,
        ] {
            let filter = RecordFilter::status(status, self.stuck_batch_size).claimed_before(cutoff);
            let records = self.store.find(&filter).await.inspect_err(|e| {
                error!(status = %status, error = %e, "Stuck scan failed");
            })?;

            for record in &records {
                match self.recover_stuck(record).await {
                    Ok(outcome) => report.record(record.id, &outcome),
                    Err(e @ SwapError::Database(_)) => {
                        error!(swap_id = %record.id, error = %e, "Stuck sweep aborted");
                        return Err(e);
                    }
                    Err(e) => {
                        error!(swap_id = %record.id, error = %e, "Stuck recovery failed");
                        report.absorb(record.id, &e.to_string());
                    }
                }
            }
        }

        if report.processed > 0 {
            info!(
                processed = report.processed,
                reset = report.reset,
                finalized = report.finalized,
                failed = report.failed,
                "Stuck sweep finished"
            );
        } else {
            debug!("No stuck transactions found");
        }
        Ok(report)
    }

    async fn recover_stuck(&self, record: &TransactionRecord) -> Result<RecordOutcome, SwapError> {
        let now = Utc::now();
        let expected = record.swap_status;
        let mut next = record.clone();

        let outcome = if expected == SwapStatus::CirxTransferInitiated {
            next.mark_completed(now)?;
            RecordOutcome::Finalized
        } else if self.policy.should_retry(record) {
            next.book_retry(now)?;
            RecordOutcome::Reset
        } else {
            let reason = format!(
                "Transaction stuck in {} after {} attempts",
                expected,
                record.retry_count + 1
            );
            next.mark_failed(reason.clone(), now)?;
            RecordOutcome::Failed(reason)
        };

        if !self.store.compare_and_update(expected, &mut next).await? {
            debug!(swap_id = %record.id, "Stuck record moved on before the sweep");
            return Ok(RecordOutcome::Superseded);
        }

        warn!(
            swap_id = %record.id,
            status = %expected,
            claimed_at = ?record.claimed_at,
            new_status = %next.swap_status,
            "Recovered stuck transaction"
        );
        Ok(outcome)
    }

    /// Catch-up pass over everything transferable, ignoring retry backoff.
    pub async fn process_batch_transfer(&self) -> Result<BulkTransferReport, SwapError> {
        let mut report = BulkTransferReport::default();
        let mut records = self
            .store
            .find(&RecordFilter::status(
                SwapStatus::PaymentVerified,
                self.bulk_batch_size,
            ))
            .await?;
        let remaining = self.bulk_batch_size.saturating_sub(records.len());
        if remaining > 0 {
            records.extend(
                self.store
                    .find(&RecordFilter::status(SwapStatus::CirxTransferPending, remaining).unclaimed())
                    .await?,
            );
        }

        for record in &records {
            match self.process_transaction(record).await {
                Ok(outcome) => report.record(record.id, &outcome),
                Err(e @ SwapError::Database(_)) => {
                    error!(swap_id = %record.id, error = %e, "Bulk transfer aborted");
                    return Err(e);
                }
                Err(e) => report.absorb(record.id, &e.to_string()),
            }
        }

        info!(
            processed = report.processed,
            completed = report.completed,
            failed = report.failed,
            "Bulk transfer finished"
        );
        Ok(report)
    }

    pub async fn statistics(&self) -> Result<TransferStatistics, SwapError> {
        Ok(TransferStatistics {
            ready_for_transfer: self.store.count(SwapStatus::PaymentVerified, false).await?,
            transfer_pending: self
                .store
                .count(SwapStatus::CirxTransferPending, false)
                .await?,
            transfer_initiated: self
                .store
                .count(SwapStatus::CirxTransferInitiated, false)
                .await?,
            completed: self.store.count(SwapStatus::Completed, false).await?,
            failed_transfers: self.store.count(SwapStatus::FailedCirxTransfer, false).await?,
            pending_retries: self
                .store
                .count(SwapStatus::CirxTransferPending, true)
                .await?,
        })
    }
}

fn classify(error: &TransferServiceError) -> AttemptFailure {
    if error.is_retryable() {
        AttemptFailure::Retryable(error.to_string())
    } else {
        AttemptFailure::Permanent(error.to_string())
    }
}
