//! Swap Records
//!
//! The persisted swap entity, its state machine and the record stores.
//!
//! # Lifecycle
//! ```text
//! pending_payment_verification ──► payment_verified ──► cirx_transfer_pending
//!        │  ▲ (retry)                                      │  ▲ (retry)
//!        ▼                                                 ▼  │
//! failed_payment_verification                 cirx_transfer_initiated ──► completed
//!                                                          │
//!                                             failed_cirx_transfer
//! ```

pub mod db;
pub mod error;
pub mod intake;
pub mod memory;
pub mod state;
pub mod store;
pub mod types;

pub use db::PgTransactionStore;
pub use error::SwapError;
pub use intake::{SwapRequest, create_pending_transaction, get_transaction};
pub use memory::InMemoryTransactionStore;
pub use state::SwapStatus;
pub use store::{RecordFilter, TransactionStore};
pub use types::{NewSwap, PaymentChain, PaymentToken, SwapId, TransactionRecord};
