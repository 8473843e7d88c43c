//! Swap Database Layer
//!
//! PostgreSQL persistence for swap records.
//! All status changes use atomic CAS (Compare-And-Swap) updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;

use super::error::SwapError;
use super::state::SwapStatus;
use super::store::{RecordFilter, TransactionStore};
use super::types::{SwapId, TransactionRecord};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS swap_transactions (
    id                      TEXT PRIMARY KEY,
    payment_tx_id           TEXT NOT NULL UNIQUE,
    payment_chain           TEXT NOT NULL,
    payment_token           TEXT NOT NULL,
    cirx_recipient_address  TEXT NOT NULL,
    amount_paid             NUMERIC(65, 18) NOT NULL,
    sender_address          TEXT,
    swap_status             TEXT NOT NULL,
    cirx_transfer_tx_id     TEXT,
    failure_reason          TEXT,
    retry_count             INTEGER NOT NULL DEFAULT 0,
    last_retry_at           TIMESTAMPTZ,
    claimed_at              TIMESTAMPTZ,
    created_at              TIMESTAMPTZ NOT NULL,
    updated_at              TIMESTAMPTZ NOT NULL,
    version                 BIGINT NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_swap_status_retry ON swap_transactions (swap_status, retry_count);
CREATE INDEX IF NOT EXISTS idx_swap_created_at ON swap_transactions (created_at);
CREATE INDEX IF NOT EXISTS idx_swap_status_updated ON swap_transactions (swap_status, updated_at);
"#;

const COLUMNS: &str = "id, payment_tx_id, payment_chain, payment_token, cirx_recipient_address, \
     amount_paid, sender_address, swap_status, cirx_transfer_tx_id, failure_reason, \
     retry_count, last_retry_at, claimed_at, created_at, updated_at, version";

/// `RecordFilter` predicate, binds $1..$8 in field order
const FILTER_WHERE: &str = "swap_status = $1 \
     AND ($2 = FALSE OR retry_count > 0) \
     AND ($3::timestamptz IS NULL OR last_retry_at IS NULL OR last_retry_at <= $3) \
     AND ($4 = FALSE OR claimed_at IS NULL) \
     AND ($5::timestamptz IS NULL OR claimed_at < $5) \
     AND ($6::timestamptz IS NULL OR created_at >= $6) \
     AND ($7::timestamptz IS NULL OR updated_at < $7) \
     AND ($8::text IS NULL OR POSITION($8 IN COALESCE(failure_reason, '')) > 0)";

/// PostgreSQL-backed record store
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    /// Create a new store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the table exists
    pub async fn connect(url: &str) -> Result<Self, SwapError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        let store = Self::new(pool);
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn init_schema(&self) -> Result<(), SwapError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: &PgRow) -> Result<TransactionRecord, SwapError> {
        let id_str: String = row.get("id");
        let corrupt = |message: String| SwapError::CorruptRecord {
            id: id_str.clone(),
            message,
        };

        let id = id_str
            .parse::<SwapId>()
            .map_err(|e| corrupt(format!("bad id: {}", e)))?;
        let status_str: String = row.get("swap_status");
        let swap_status = status_str.parse::<SwapStatus>().map_err(corrupt)?;
        let chain_str: String = row.get("payment_chain");
        let token_str: String = row.get("payment_token");
        let retry_count: i32 = row.get("retry_count");

        Ok(TransactionRecord {
            id,
            payment_tx_id: row.get("payment_tx_id"),
            payment_chain: chain_str.parse().map_err(|e: SwapError| corrupt(e.to_string()))?,
            payment_token: token_str.parse().map_err(|e: SwapError| corrupt(e.to_string()))?,
            cirx_recipient_address: row.get("cirx_recipient_address"),
            amount_paid: row.get::<Decimal, _>("amount_paid"),
            sender_address: row.get("sender_address"),
            swap_status,
            cirx_transfer_tx_id: row.get("cirx_transfer_tx_id"),
            failure_reason: row.get("failure_reason"),
            retry_count: u32::try_from(retry_count)
                .map_err(|_| corrupt(format!("negative retry_count {}", retry_count)))?,
            last_retry_at: row.get::<Option<DateTime<Utc>>, _>("last_retry_at"),
            claimed_at: row.get::<Option<DateTime<Utc>>, _>("claimed_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            version: row.get("version"),
        })
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn insert(&self, record: &TransactionRecord) -> Result<(), SwapError> {
        let result = sqlx::query(
            r#"
            INSERT INTO swap_transactions
                (id, payment_tx_id, payment_chain, payment_token, cirx_recipient_address,
                 amount_paid, sender_address, swap_status, retry_count, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (payment_tx_id) DO NOTHING
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.payment_tx_id)
        .bind(record.payment_chain.as_str())
        .bind(record.payment_token.as_str())
        .bind(&record.cirx_recipient_address)
        .bind(record.amount_paid)
        .bind(&record.sender_address)
        .bind(record.swap_status.as_str())
        .bind(record.retry_count as i32)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SwapError::DuplicateDeposit(record.payment_tx_id.clone()));
        }
        Ok(())
    }

    async fn get(&self, id: SwapId) -> Result<Option<TransactionRecord>, SwapError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM swap_transactions WHERE id = $1",
            COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn get_by_payment_tx_id(
        &self,
        payment_tx_id: &str,
    ) -> Result<Option<TransactionRecord>, SwapError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM swap_transactions WHERE payment_tx_id = $1",
            COLUMNS
        ))
        .bind(payment_tx_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn find(&self, filter: &RecordFilter) -> Result<Vec<TransactionRecord>, SwapError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM swap_transactions WHERE {} ORDER BY created_at ASC, id ASC LIMIT $9",
            COLUMNS, FILTER_WHERE
        ))
        .bind(filter.status.as_str())
        .bind(filter.retries_only)
        .bind(filter.due_before)
        .bind(filter.unclaimed_only)
        .bind(filter.claimed_before)
        .bind(filter.created_since)
        .bind(filter.updated_before)
        .bind(filter.reason_contains.as_deref())
        .bind(filter.limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn compare_and_update(
        &self,
        expected: SwapStatus,
        record: &mut TransactionRecord,
    ) -> Result<bool, SwapError> {
        let result = sqlx::query(
            r#"
            UPDATE swap_transactions
            SET swap_status = $1, cirx_transfer_tx_id = $2, failure_reason = $3,
                retry_count = $4, last_retry_at = $5, claimed_at = $6,
                updated_at = $7, version = version + 1
            WHERE id = $8 AND swap_status = $9 AND version = $10
            "#,
        )
        .bind(record.swap_status.as_str())
        .bind(&record.cirx_transfer_tx_id)
        .bind(&record.failure_reason)
        .bind(record.retry_count as i32)
        .bind(record.last_retry_at)
        .bind(record.claimed_at)
        .bind(record.updated_at)
        .bind(record.id.to_string())
        .bind(expected.as_str())
        .bind(record.version)
        .execute(&self.pool)
        .await?;

        let won = result.rows_affected() > 0;
        if won {
            record.version += 1;
        }
        Ok(won)
    }

    async fn count(&self, status: SwapStatus, retries_only: bool) -> Result<u64, SwapError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM swap_transactions WHERE swap_status = $1 AND ($2 = FALSE OR retry_count > 0)",
        )
        .bind(status.as_str())
        .bind(retries_only)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    async fn count_matching(&self, filter: &RecordFilter) -> Result<u64, SwapError> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM swap_transactions WHERE {}",
            FILTER_WHERE
        ))
        .bind(filter.status.as_str())
        .bind(filter.retries_only)
        .bind(filter.due_before)
        .bind(filter.unclaimed_only)
        .bind(filter.claimed_before)
        .bind(filter.created_since)
        .bind(filter.updated_before)
        .bind(filter.reason_contains.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }
}
