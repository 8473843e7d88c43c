//! CIRX Settlement - OTC swap settlement pipeline
//!
//! Customers pay on an EVM chain; the pipeline verifies the deposit and
//! delivers CIRX on the Circular ledger.
//!
//! # Modules
//!
//! - [`swap`] - Swap records, state graph, store, intake
//! - [`protocol`] - Circular ledger gateway client, codec, signing
//! - [`services`] - Verification, transfer and pricing contracts
//! - [`worker`] - Verification and transfer workers, scheduler
//! - [`money`] - Decimal ⇄ smallest-unit conversion
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod logging;
pub mod money;
pub mod protocol;
pub mod services;
pub mod swap;
pub mod worker;

// Convenient re-exports at crate root
pub use config::{AppConfig, ConfigError};
pub use protocol::{LedgerSigner, ProtocolClient, ProtocolError};
pub use services::{
    CirxTransferService, EvmPaymentVerifier, LedgerTransferService, PaymentVerificationService,
    TieredPricing,
};
pub use swap::{
    InMemoryTransactionStore, PgTransactionStore, SwapError, SwapId, SwapRequest, SwapStatus,
    TransactionRecord, TransactionStore, create_pending_transaction, get_transaction,
};
pub use worker::{
    CirxTransferWorker, PaymentVerificationWorker, SettlementScheduler, TransactionMonitor,
};
