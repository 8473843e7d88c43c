//! Swap Core Types
//!
//! The persisted swap record and its guarded transitions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::error::SwapError;
use super::state::SwapStatus;

/// Swap ID - ULID-based unique identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwapId(ulid::Ulid);

impl SwapId {
    /// Generate a new unique SwapId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Get the inner ULID value
    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for SwapId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SwapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SwapId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for SwapId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Serialize for SwapStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Source chain the deposit was made on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentChain {
    Ethereum,
    Polygon,
    BinanceSmartChain,
}

impl PaymentChain {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentChain::Ethereum => "ethereum",
            PaymentChain::Polygon => "polygon",
            PaymentChain::BinanceSmartChain => "binance-smart-chain",
        }
    }

    /// Token paid as the chain's native coin (no contract)
    pub fn native_token(&self) -> PaymentToken {
        match self {
            PaymentChain::Ethereum => PaymentToken::Eth,
            PaymentChain::Polygon => PaymentToken::Matic,
            PaymentChain::BinanceSmartChain => PaymentToken::Bnb,
        }
    }
}

impl fmt::Display for PaymentChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentChain {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ethereum" => Ok(PaymentChain::Ethereum),
            "polygon" => Ok(PaymentChain::Polygon),
            "binance-smart-chain" => Ok(PaymentChain::BinanceSmartChain),
            _ => Err(SwapError::invalid(
                "payment_chain",
                format!("unsupported payment chain: {}", s),
            )),
        }
    }
}

/// Token the deposit was paid in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentToken {
    Eth,
    Usdc,
    Usdt,
    Bnb,
    Matic,
}

impl PaymentToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentToken::Eth => "ETH",
            PaymentToken::Usdc => "USDC",
            PaymentToken::Usdt => "USDT",
            PaymentToken::Bnb => "BNB",
            PaymentToken::Matic => "MATIC",
        }
    }

    /// On-chain decimals of the token
    pub fn decimals(&self) -> u32 {
        match self {
            PaymentToken::Usdc | PaymentToken::Usdt => 6,
            PaymentToken::Eth | PaymentToken::Bnb | PaymentToken::Matic => 18,
        }
    }
}

impl fmt::Display for PaymentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentToken {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ETH" => Ok(PaymentToken::Eth),
            "USDC" => Ok(PaymentToken::Usdc),
            "USDT" => Ok(PaymentToken::Usdt),
            "BNB" => Ok(PaymentToken::Bnb),
            "MATIC" => Ok(PaymentToken::Matic),
            _ => Err(SwapError::invalid(
                "payment_token",
                format!("unsupported payment token: {}", s),
            )),
        }
    }
}

/// Validated creation parameters for a swap
#[derive(Debug, Clone)]
pub struct NewSwap {
    pub payment_tx_id: String,
    pub payment_chain: PaymentChain,
    pub payment_token: PaymentToken,
    pub cirx_recipient_address: String,
    pub amount_paid: Decimal,
    pub sender_address: Option<String>,
}

/// One OTC swap, from deposit to CIRX delivery.
///
/// Records are never deleted. Every mutation goes through one of the
/// `mark_*` / `book_*` / `claim_*` methods below, which refuse edges that
/// are not in the swap graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub id: SwapId,
    pub payment_tx_id: String,
    pub payment_chain: PaymentChain,
    pub payment_token: PaymentToken,
    pub cirx_recipient_address: String,
    pub amount_paid: Decimal,
    pub sender_address: Option<String>,
    pub swap_status: SwapStatus,
    pub cirx_transfer_tx_id: Option<String>,
    pub failure_reason: Option<String>,
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    /// Set while a transfer attempt is in progress
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-lock counter, bumped by every successful guarded update
    #[serde(skip)]
    pub version: i64,
}

impl TransactionRecord {
    /// New record in `pending_payment_verification`
    pub fn new(swap: NewSwap, now: DateTime<Utc>) -> Self {
        Self {
            id: SwapId::new(),
            payment_tx_id: swap.payment_tx_id,
            payment_chain: swap.payment_chain,
            payment_token: swap.payment_token,
            cirx_recipient_address: swap.cirx_recipient_address,
            amount_paid: swap.amount_paid,
            sender_address: swap.sender_address,
            swap_status: SwapStatus::PendingPaymentVerification,
            cirx_transfer_tx_id: None,
            failure_reason: None,
            retry_count: 0,
            last_retry_at: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Transfer-stage record with no attempt in progress
    pub fn is_awaiting_retry(&self) -> bool {
        self.swap_status == SwapStatus::CirxTransferPending && self.claimed_at.is_none()
    }

    fn transition(&mut self, next: SwapStatus, now: DateTime<Utc>) -> Result<(), SwapError> {
        if !self.swap_status.can_transition_to(next) {
            return Err(SwapError::InvalidStateTransition {
                from: self.swap_status,
                to: next,
            });
        }
        if !next.carries_ledger_tx() {
            self.cirx_transfer_tx_id = None;
        }
        self.swap_status = next;
        self.updated_at = now;
        Ok(())
    }

    /// `pending_payment_verification` → `payment_verified`
    ///
    /// The retry counter is per stage, so it restarts for the transfer stage.
    pub fn mark_payment_verified(&mut self, now: DateTime<Utc>) -> Result<(), SwapError> {
        self.transition(SwapStatus::PaymentVerified, now)?;
        self.retry_count = 0;
        self.last_retry_at = None;
        Ok(())
    }

    /// Book a failed attempt that still has budget left.
    pub fn book_retry(&mut self, now: DateTime<Utc>) -> Result<(), SwapError> {
        let next = match self.swap_status {
            SwapStatus::PendingPaymentVerification => SwapStatus::PendingPaymentVerification,
            s if s.is_in_flight() => SwapStatus::CirxTransferPending,
            from => {
                return Err(SwapError::InvalidStateTransition {
                    from,
                    to: SwapStatus::CirxTransferPending,
                });
            }
        };
        self.transition(next, now)?;
        self.retry_count += 1;
        self.last_retry_at = Some(now);
        self.claimed_at = None;
        Ok(())
    }

    /// Move to the current stage's `failed_*` terminal.
    pub fn mark_failed(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), SwapError> {
        let next = match self.swap_status {
            SwapStatus::PendingPaymentVerification => SwapStatus::FailedPaymentVerification,
            _ => SwapStatus::FailedCirxTransfer,
        };
        self.transition(next, now)?;
        self.failure_reason = Some(reason.into());
        self.claimed_at = None;
        Ok(())
    }

    /// Take the record for a transfer attempt (persist-before-call).
    pub fn claim_for_transfer(&mut self, now: DateTime<Utc>) -> Result<(), SwapError> {
        let claimable = self.swap_status == SwapStatus::PaymentVerified || self.is_awaiting_retry();
        if !claimable {
            return Err(SwapError::InvalidStateTransition {
                from: self.swap_status,
                to: SwapStatus::CirxTransferPending,
            });
        }
        self.transition(SwapStatus::CirxTransferPending, now)?;
        self.claimed_at = Some(now);
        Ok(())
    }

    /// Ledger accepted the transfer.
    pub fn mark_transfer_initiated(
        &mut self,
        ledger_tx_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), SwapError> {
        self.transition(SwapStatus::CirxTransferInitiated, now)?;
        self.cirx_transfer_tx_id = Some(ledger_tx_id.into());
        Ok(())
    }

    /// `cirx_transfer_initiated` → `completed`
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> Result<(), SwapError> {
        self.transition(SwapStatus::Completed, now)?;
        self.claimed_at = None;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_swap_id_roundtrip() {
        let id = SwapId::new();
        assert_eq!(id.to_string().parse::<SwapId>().unwrap(), id);
    }

    #[test]
    fn test_token_decimals() {
        assert_eq!(PaymentToken::Usdc.decimals(), 6);
        assert_eq!(PaymentToken::Eth.decimals(), 18);
        assert_eq!("USDT".parse::<PaymentToken>().unwrap(), PaymentToken::Usdt);
        assert!("usdt".parse::<PaymentToken>().is_err());
        assert_eq!(
            "binance-smart-chain".parse::<PaymentChain>().unwrap(),
            PaymentChain::BinanceSmartChain
        );
    }

    #[test]
    fn test_happy_path_transitions() {
        let now = Utc::now();
        let mut record = TransactionRecord::new(new_swap(&deposit_hash(1)), now);

        record.mark_payment_verified(now).unwrap();
        record.claim_for_transfer(now).unwrap();
        assert_eq!(record.swap_status, SwapStatus::CirxTransferPending);
        assert!(!record.is_awaiting_retry());

        record.mark_transfer_initiated("0xabc", now).unwrap();
        assert_eq!(record.cirx_transfer_tx_id.as_deref(), Some("0xabc"));

        record.mark_completed(now).unwrap();
        assert_eq!(record.swap_status, SwapStatus::Completed);
        assert_eq!(record.cirx_transfer_tx_id.as_deref(), Some("0xabc"));
        assert!(record.claimed_at.is_none());
    }

    #[test]
    fn test_cannot_complete_from_verified() {
        let now = Utc::now();
        let mut record = TransactionRecord::new(new_swap(&deposit_hash(2)), now);
        record.mark_payment_verified(now).unwrap();

        let err = record.mark_completed(now).unwrap_err();
        assert!(matches!(err, SwapError::InvalidStateTransition { .. }));
        assert_eq!(record.swap_status, SwapStatus::PaymentVerified);
    }

    #[test]
    fn test_verification_retry_then_fail() {
        let now = Utc::now();
        let mut record = TransactionRecord::new(new_swap(&deposit_hash(3)), now);

        record.book_retry(now).unwrap();
        assert_eq!(record.retry_count, 1);
        assert_eq!(record.last_retry_at, Some(now));
        assert_eq!(record.swap_status, SwapStatus::PendingPaymentVerification);
        assert!(record.failure_reason.is_none());

        record.mark_failed("gone", now).unwrap();
        assert_eq!(record.swap_status, SwapStatus::FailedPaymentVerification);
        assert_eq!(record.failure_reason.as_deref(), Some("gone"));
    }

    #[test]
    fn test_transfer_retry_releases_claim() {
        let now = Utc::now();
        let mut record = TransactionRecord::new(new_swap(&deposit_hash(4)), now);
        record.mark_payment_verified(now).unwrap();
        record.claim_for_transfer(now).unwrap();

        record.book_retry(now).unwrap();
        assert!(record.is_awaiting_retry());
        assert_eq!(record.retry_count, 1);

        // Re-claim for the next attempt; a second claim is refused
        record.claim_for_transfer(now).unwrap();
        assert!(record.claim_for_transfer(now).is_err());
    }

    #[test]
    fn test_verified_resets_stage_counter() {
        let now = Utc::now();
        let mut record = TransactionRecord::new(new_swap(&deposit_hash(5)), now);
        record.book_retry(now).unwrap();
        record.mark_payment_verified(now).unwrap();
        assert_eq!(record.retry_count, 0);
        assert!(record.last_retry_at.is_none());
    }

    #[test]
    fn test_failure_from_initiated_clears_ledger_tx() {
        let now = Utc::now();
        let mut record = TransactionRecord::new(new_swap(&deposit_hash(6)), now);
        record.mark_payment_verified(now).unwrap();
        record.claim_for_transfer(now).unwrap();
        record.mark_transfer_initiated("tx", now).unwrap();

        record.mark_failed("rejected", now).unwrap();
        assert_eq!(record.swap_status, SwapStatus::FailedCirxTransfer);
        assert!(record.cirx_transfer_tx_id.is_none());
    }
}
