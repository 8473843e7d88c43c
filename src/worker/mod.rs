//! Settlement Workers
//!
//! Batch passes that advance swap records through verification and
//! transfer. Workers hold no record state of their own: every decision is
//! re-read from the store and written back with a guarded update, so passes
//! can be re-run (or run concurrently) without double-processing.
//!
//! # Retry Model
//!
//! Each stage has its own budget (`max_retries`) and backoff
//! (`retry_delay`). A record is picked up again only once
//! `last_retry_at + retry_delay` has passed. Runtime changes to either
//! setting apply from the next pass.

pub mod monitor;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod transfer;
pub mod verification;


pub use report::{
    BulkTransferReport, RecordError, RecordOutcome, StuckSweepReport, TransferBatchReport,
    TransferStatistics, VerificationBatchReport, VerificationStatistics,
};
pub use monitor::{
    Alert, AlertKind, HealthStatus, MonitoringReport, Severity, TransactionMonitor,
};
pub use retry::RetryPolicy;
pub use scheduler::{PassFailure, SettlementScheduler, TickReport};
pub use transfer::CirxTransferWorker;
pub use verification::PaymentVerificationWorker;
