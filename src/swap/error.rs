//! Swap Error Types

use thiserror::Error;

use super::state::SwapStatus;

/// Errors surfaced by the record store and the intake operations.
///
/// Only `Database` aborts a worker batch; every other variant is handled
/// per record.
#[derive(Error, Debug, Clone)]
pub enum SwapError {
    #[error("Deposit {0} has already been submitted")]
    DuplicateDeposit(String),

    #[error("Transaction not found: {0}")]
    NotFound(String),

    #[error("Invalid {field}: {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: SwapStatus, to: SwapStatus },

    #[error("Corrupt record {id}: {message}")]
    CorruptRecord { id: String, message: String },

    #[error("Ledger transfer {tx_id} for swap {id} could not be recorded")]
    UnrecordedTransfer { id: String, tx_id: String },

    #[error("Database error: {0}")]
    Database(String),
}

impl SwapError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        SwapError::InvalidInput {
            field,
            message: message.into(),
        }
    }

    /// Stable error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            SwapError::DuplicateDeposit(_) => "DUPLICATE_DEPOSIT",
            SwapError::NotFound(_) => "NOT_FOUND",
            SwapError::InvalidInput { .. } => "INVALID_INPUT",
            SwapError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            SwapError::CorruptRecord { .. } => "CORRUPT_RECORD",
            SwapError::UnrecordedTransfer { .. } => "UNRECORDED_TRANSFER",
            SwapError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// HTTP status code for the inbound handler
    pub fn http_status(&self) -> u16 {
        match self {
            SwapError::DuplicateDeposit(_) => 409,
            SwapError::NotFound(_) => 404,
            SwapError::InvalidInput { .. } => 400,
            SwapError::InvalidStateTransition { .. }
            | SwapError::CorruptRecord { .. }
            | SwapError::UnrecordedTransfer { .. }
            | SwapError::Database(_) => 500,
        }
    }
}

impl From<sqlx::Error> for SwapError {
    fn from(e: sqlx::Error) -> Self {
        SwapError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SwapError::DuplicateDeposit("0xabc".into()).code(),
            "DUPLICATE_DEPOSIT"
        );
        assert_eq!(SwapError::NotFound("x".into()).http_status(), 404);
        assert_eq!(SwapError::invalid("amount_paid", "zero").http_status(), 400);
    }

    #[test]
    fn test_error_display() {
        let err = SwapError::InvalidStateTransition {
            from: SwapStatus::PaymentVerified,
            to: SwapStatus::Completed,
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition from payment_verified to completed"
        );
    }
}
