//! Payment verification contract.

use async_trait::async_trait;
use thiserror::Error;

use crate::swap::TransactionRecord;

/// Outcome of checking a deposit on its source chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationVerdict {
    pub is_valid: bool,
    pub reason: Option<String>,
}

impl VerificationVerdict {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Faults while talking to the source chain (as opposed to a negative verdict)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("RPC transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed RPC response: {0}")]
    Decode(String),

    #[error("Chain not configured: {0}")]
    ChainNotConfigured(String),
}

#[async_trait]
pub trait PaymentVerificationService: Send + Sync {
    /// Name for logging
    fn name(&self) -> &'static str;

    /// Check that `record`'s deposit exists, is confirmed, went to the project
    /// wallet and covers `amount_paid`.
    async fn verify(
        &self,
        record: &TransactionRecord,
    ) -> Result<VerificationVerdict, VerificationError>;
}
