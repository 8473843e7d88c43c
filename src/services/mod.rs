//! Settlement Services
//!
//! Collaborators the workers call across a process boundary: the source
//! chain (deposit verification) and the ledger (CIRX delivery). Workers
//! hold them as trait objects so tests can inject doubles.

pub mod evm;
pub mod pricing;
pub mod transfer;
pub mod verification;

#[cfg(test)]
pub mod mock;

pub use evm::EvmPaymentVerifier;
pub use pricing::{PricingError, SettlementPricing, TieredPricing};
pub use transfer::{
    CirxTransferService, LedgerTransferService, TransferOutcome, TransferServiceError,
};
pub use verification::{PaymentVerificationService, VerificationError, VerificationVerdict};
