//! Swap State Machine
//!
//! Status names are persisted verbatim and returned to status callers.

use std::fmt;
use std::str::FromStr;

/// Swap lifecycle status
///
/// Terminal: COMPLETED, FAILED_PAYMENT_VERIFICATION, FAILED_CIRX_TRANSFER
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapStatus {
    /// Initial state - deposit recorded, not yet confirmed on the source chain
    PendingPaymentVerification,

    /// Deposit confirmed, ready for CIRX transfer
    PaymentVerified,

    /// Transfer claimed by a worker or awaiting retry (persist-before-call)
    CirxTransferPending,

    /// Ledger accepted the transfer, tx id recorded
    CirxTransferInitiated,

    /// Terminal: CIRX delivered
    Completed,

    /// Terminal: deposit could not be verified within the retry budget
    FailedPaymentVerification,

    /// Terminal: CIRX could not be delivered
    FailedCirxTransfer,
}

impl SwapStatus {
    pub const ALL: [SwapStatus; 7] = [
        SwapStatus::PendingPaymentVerification,
        SwapStatus::PaymentVerified,
        SwapStatus::CirxTransferPending,
        SwapStatus::CirxTransferInitiated,
        SwapStatus::Completed,
        SwapStatus::FailedPaymentVerification,
        SwapStatus::FailedCirxTransfer,
    ];

    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SwapStatus::Completed
                | SwapStatus::FailedPaymentVerification
                | SwapStatus::FailedCirxTransfer
        )
    }

    /// Check if a CIRX transfer has started but not reached a terminal state
    #[inline]
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            SwapStatus::CirxTransferPending | SwapStatus::CirxTransferInitiated
        )
    }

    /// Whether a ledger tx id must be present in this state
    #[inline]
    pub fn carries_ledger_tx(&self) -> bool {
        matches!(
            self,
            SwapStatus::CirxTransferInitiated | SwapStatus::Completed
        )
    }

    /// Legal edges of the swap graph.
    ///
    /// Self-edges exist only where a failed attempt is booked without
    /// leaving the stage.
    pub fn can_transition_to(&self, next: SwapStatus) -> bool {
        use SwapStatus::*;
        matches!(
            (self, next),
            (PendingPaymentVerification, PaymentVerified)
                | (PendingPaymentVerification, PendingPaymentVerification)
                | (PendingPaymentVerification, FailedPaymentVerification)
                | (PaymentVerified, CirxTransferPending)
                | (CirxTransferPending, CirxTransferPending)
                | (CirxTransferPending, CirxTransferInitiated)
                | (CirxTransferPending, FailedCirxTransfer)
                | (CirxTransferInitiated, Completed)
                | (CirxTransferInitiated, CirxTransferPending)
                | (CirxTransferInitiated, FailedCirxTransfer)
        )
    }

    /// Persisted name
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapStatus::PendingPaymentVerification => "pending_payment_verification",
            SwapStatus::PaymentVerified => "payment_verified",
            SwapStatus::CirxTransferPending => "cirx_transfer_pending",
            SwapStatus::CirxTransferInitiated => "cirx_transfer_initiated",
            SwapStatus::Completed => "completed",
            SwapStatus::FailedPaymentVerification => "failed_payment_verification",
            SwapStatus::FailedCirxTransfer => "failed_cirx_transfer",
        }
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SwapStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SwapStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown swap status: {}", s))
    }
}
