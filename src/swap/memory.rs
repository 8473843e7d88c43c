//! In-process record store.
//!
//! Same guarded-update semantics as the PostgreSQL store; used when no
//! `postgres_url` is configured and by the worker tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::error::SwapError;
use super::state::SwapStatus;
use super::store::{RecordFilter, TransactionStore};
use super::types::{SwapId, TransactionRecord};

#[derive(Default)]
struct Tables {
    records: HashMap<SwapId, TransactionRecord>,
    by_payment_tx: HashMap<String, SwapId>,
}

#[derive(Default)]
pub struct InMemoryTransactionStore {
    tables: Mutex<Tables>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>, SwapError> {
        self.tables
            .lock()
            .map_err(|_| SwapError::Database("record store lock poisoned".to_string()))
    }

    /// Overwrite a record unconditionally, for seeding test fixtures.
    #[cfg(test)]
    pub fn put(&self, record: TransactionRecord) {
        let mut tables = self.tables.lock().unwrap();
        tables
            .by_payment_tx
            .insert(record.payment_tx_id.clone(), record.id);
        tables.records.insert(record.id, record);
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, record: &TransactionRecord) -> Result<(), SwapError> {
        let mut tables = self.lock()?;
        if tables.by_payment_tx.contains_key(&record.payment_tx_id) {
            return Err(SwapError::DuplicateDeposit(record.payment_tx_id.clone()));
        }
        tables
            .by_payment_tx
            .insert(record.payment_tx_id.clone(), record.id);
        tables.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: SwapId) -> Result<Option<TransactionRecord>, SwapError> {
        Ok(self.lock()?.records.get(&id).cloned())
    }

    async fn get_by_payment_tx_id(
        &self,
        payment_tx_id: &str,
    ) -> Result<Option<TransactionRecord>, SwapError> {
        let tables = self.lock()?;
        Ok(tables
            .by_payment_tx
            .get(payment_tx_id)
            .and_then(|id| tables.records.get(id))
            .cloned())
    }

    async fn find(&self, filter: &RecordFilter) -> Result<Vec<TransactionRecord>, SwapError> {
        let tables = self.lock()?;
        let mut matched: Vec<TransactionRecord> = tables
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matched.sort_by_key(|r| (r.created_at, r.id));
        matched.truncate(filter.limit);
        Ok(matched)
    }

    async fn compare_and_update(
        &self,
        expected: SwapStatus,
        record: &mut TransactionRecord,
    ) -> Result<bool, SwapError> {
        let mut tables = self.lock()?;
        let Some(stored) = tables.records.get_mut(&record.id) else {
            return Ok(false);
        };
        if stored.swap_status != expected || stored.version != record.version {
            return Ok(false);
        }
        record.version += 1;
        *stored = record.clone();
        Ok(true)
    }

    async fn count(&self, status: SwapStatus, retries_only: bool) -> Result<u64, SwapError> {
        let tables = self.lock()?;
        Ok(tables
            .records
            .values()
            .filter(|r| r.swap_status == status && (!retries_only || r.retry_count > 0))
            .count() as u64)
    }

    async fn count_matching(&self, filter: &RecordFilter) -> Result<u64, SwapError> {
        let tables = self.lock()?;
        Ok(tables.records.values().filter(|r| filter.matches(r)).count() as u64)
    }
}
