//! Batch reports and statistics returned to the scheduler.

use serde::Serialize;

use crate::swap::SwapId;

/// What one worker invocation did to one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Verified,
    Completed,
    /// Failed attempt booked, budget left
    Retried(String),
    /// Moved to the stage's `failed_*` terminal
    Failed(String),
    /// Stuck claim released for another attempt
    Reset,
    /// Stuck `cirx_transfer_initiated` moved to `completed`
    Finalized,
    /// Another worker advanced the record first
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordError {
    pub swap_id: SwapId,
    pub error: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationBatchReport {
    pub processed: usize,
    pub verified: usize,
    pub failed: usize,
    pub retried: usize,
    pub errors: Vec<RecordError>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TransferBatchReport {
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
    pub retried: usize,
    pub errors: Vec<RecordError>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StuckSweepReport {
    pub processed: usize,
    pub reset: usize,
    pub failed: usize,
    pub finalized: usize,
    pub errors: Vec<RecordError>,
}

/// Bulk pass: any attempt that did not complete counts as `failed`
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BulkTransferReport {
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
    pub errors: Vec<RecordError>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationStatistics {
    pub pending_verification: u64,
    pub pending_retries: u64,
    pub failed_verification: u64,
    pub payment_verified: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TransferStatistics {
    pub ready_for_transfer: u64,
    pub transfer_pending: u64,
    pub transfer_initiated: u64,
    pub completed: u64,
    pub failed_transfers: u64,
    pub pending_retries: u64,
}

fn push_error(errors: &mut Vec<RecordError>, swap_id: SwapId, error: &str) {
    errors.push(RecordError {
        swap_id,
        error: error.to_string(),
    });
}

impl VerificationBatchReport {
    pub fn record(&mut self, swap_id: SwapId, outcome: &RecordOutcome) {
        if *outcome == RecordOutcome::Superseded {
            return;
        }
        self.processed += 1;
        match outcome {
            RecordOutcome::Verified => self.verified += 1,
            RecordOutcome::Retried(e) => {
                self.retried += 1;
                push_error(&mut self.errors, swap_id, e);
            }
            RecordOutcome::Failed(e) => {
                self.failed += 1;
                push_error(&mut self.errors, swap_id, e);
            }
            _ => {}
        }
    }

    pub fn absorb(&mut self, swap_id: SwapId, error: &str) {
        push_error(&mut self.errors, swap_id, error);
    }
}

impl TransferBatchReport {
    pub fn record(&mut self, swap_id: SwapId, outcome: &RecordOutcome) {
        if *outcome == RecordOutcome::Superseded {
            return;
        }
        self.processed += 1;
        match outcome {
            RecordOutcome::Completed => self.completed += 1,
            RecordOutcome::Retried(e) => {
                self.retried += 1;
                push_error(&mut self.errors, swap_id, e);
            }
            RecordOutcome::Failed(e) => {
                self.failed += 1;
                push_error(&mut self.errors, swap_id, e);
            }
            _ => {}
        }
    }

    pub fn absorb(&mut self, swap_id: SwapId, error: &str) {
        push_error(&mut self.errors, swap_id, error);
    }

    pub fn merge(&mut self, other: TransferBatchReport) {
        self.processed += other.processed;
        self.completed += other.completed;
        self.failed += other.failed;
        self.retried += other.retried;
        self.errors.extend(other.errors);
    }
}

impl StuckSweepReport {
    pub fn record(&mut self, swap_id: SwapId, outcome: &RecordOutcome) {
        if *outcome == RecordOutcome::Superseded {
            return;
        }
        self.processed += 1;
        match outcome {
            RecordOutcome::Reset => self.reset += 1,
            RecordOutcome::Finalized => self.finalized += 1,
            RecordOutcome::Failed(e) => {
                self.failed += 1;
                push_error(&mut self.errors, swap_id, e);
            }
            _ => {}
        }
    }

    pub fn absorb(&mut self, swap_id: SwapId, error: &str) {
        push_error(&mut self.errors, swap_id, error);
    }
}

impl BulkTransferReport {
    pub fn record(&mut self, swap_id: SwapId, outcome: &RecordOutcome) {
        if *outcome == RecordOutcome::Superseded {
            return;
        }
        self.processed += 1;
        match outcome {
            RecordOutcome::Completed => self.completed += 1,
            RecordOutcome::Retried(e) | RecordOutcome::Failed(e) => {
                self.failed += 1;
                push_error(&mut self.errors, swap_id, e);
            }
            _ => {}
        }
    }

    pub fn absorb(&mut self, swap_id: SwapId, error: &str) {
        push_error(&mut self.errors, swap_id, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superseded_is_not_counted() {
        let mut report = VerificationBatchReport::default();
        report.record(SwapId::new(), &RecordOutcome::Superseded);
        assert_eq!(report, VerificationBatchReport::default());
    }

    #[test]
    fn test_bulk_counts_retries_as_failed() {
        let mut report = BulkTransferReport::default();
        let id = SwapId::new();
        report.record(id, &RecordOutcome::Completed);
        report.record(id, &RecordOutcome::Retried("timeout".into()));
        assert_eq!(report.processed, 2);
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors[0].error, "timeout");
    }

    #[test]
    fn test_transfer_report_merge() {
        let mut a = TransferBatchReport::default();
        a.record(SwapId::new(), &RecordOutcome::Completed);
        let mut b = TransferBatchReport::default();
        b.record(SwapId::new(), &RecordOutcome::Failed("bad".into()));
        a.merge(b);
        assert_eq!((a.processed, a.completed, a.failed), (2, 1, 1));
    }
}
