//! Record Store
//!
//! The persisted record store is the only shared mutable resource of the
//! pipeline. All mutation is a whole-record write guarded by the record's
//! current status and version.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::SwapError;
use super::state::SwapStatus;
use super::types::{SwapId, TransactionRecord};

/// Scan filter for worker passes
#[derive(Debug, Clone)]
pub struct RecordFilter {
    pub status: SwapStatus,
    /// Only records with `retry_count > 0`
    pub retries_only: bool,
    /// Only records whose `last_retry_at` is unset or not after this instant
    pub due_before: Option<DateTime<Utc>>,
    /// Only records with no transfer attempt in progress
    pub unclaimed_only: bool,
    /// Only records claimed before this instant
    pub claimed_before: Option<DateTime<Utc>>,
    /// Only records created at or after this instant
    pub created_since: Option<DateTime<Utc>>,
    /// Only records last written before this instant
    pub updated_before: Option<DateTime<Utc>>,
    /// Only records whose failure reason contains this text
    pub reason_contains: Option<String>,
    pub limit: usize,
}

impl RecordFilter {
    pub fn status(status: SwapStatus, limit: usize) -> Self {
        Self {
            status,
            retries_only: false,
            due_before: None,
            unclaimed_only: false,
            claimed_before: None,
            created_since: None,
            updated_before: None,
            reason_contains: None,
            limit,
        }
    }

    pub fn retries_only(mut self) -> Self {
        self.retries_only = true;
        self
    }

    pub fn due_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.due_before = Some(cutoff);
        self
    }

    pub fn unclaimed(mut self) -> Self {
        self.unclaimed_only = true;
        self
    }

    pub fn claimed_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.claimed_before = Some(cutoff);
        self
    }

    pub fn created_since(mut self, since: DateTime<Utc>) -> Self {
        self.created_since = Some(since);
        self
    }

    pub fn updated_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.updated_before = Some(cutoff);
        self
    }

    pub fn reason_contains(mut self, text: impl Into<String>) -> Self {
        self.reason_contains = Some(text.into());
        self
    }

    /// In-process evaluation, shared by the memory store and tests
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        if record.swap_status != self.status {
            return false;
        }
        if self.retries_only && record.retry_count == 0 {
            return false;
        }
        if let (Some(cutoff), Some(last)) = (self.due_before, record.last_retry_at) {
            if last > cutoff {
                return false;
            }
        }
        if self.unclaimed_only && record.claimed_at.is_some() {
            return false;
        }
        if let Some(cutoff) = self.claimed_before {
            match record.claimed_at {
                Some(claimed) if claimed < cutoff => {}
                _ => return false,
            }
        }
        if self.created_since.is_some_and(|since| record.created_at < since) {
            return false;
        }
        if self.updated_before.is_some_and(|cutoff| record.updated_at >= cutoff) {
            return false;
        }
        if let Some(text) = &self.reason_contains {
            match &record.failure_reason {
                Some(reason) if reason.contains(text.as_str()) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Storage backend for swap records
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert a new record.
    ///
    /// Returns `DuplicateDeposit` if `payment_tx_id` already exists; the
    /// existing record is left untouched.
    async fn insert(&self, record: &TransactionRecord) -> Result<(), SwapError>;

    async fn get(&self, id: SwapId) -> Result<Option<TransactionRecord>, SwapError>;

    async fn get_by_payment_tx_id(
        &self,
        payment_tx_id: &str,
    ) -> Result<Option<TransactionRecord>, SwapError>;

    /// Records matching `filter`, oldest first, at most `filter.limit`
    async fn find(&self, filter: &RecordFilter) -> Result<Vec<TransactionRecord>, SwapError>;

    /// Write `record` if the stored copy still has status `expected` and the
    /// same version.
    ///
    /// On success the stored version is bumped and `record.version` follows.
    /// Returns `false` when another writer got there first.
    async fn compare_and_update(
        &self,
        expected: SwapStatus,
        record: &mut TransactionRecord,
    ) -> Result<bool, SwapError>;

    async fn count(&self, status: SwapStatus, retries_only: bool) -> Result<u64, SwapError>;

    /// Number of records matching `filter`; `filter.limit` is ignored
    async fn count_matching(&self, filter: &RecordFilter) -> Result<u64, SwapError>;
}
