//! CIRX transfer contract and the ledger-backed implementation.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::pricing::{PricingError, SettlementPricing};
use crate::protocol::{ProtocolClient, ProtocolError, codec};
use crate::swap::{PaymentToken, TransactionRecord};

/// Result of one transfer attempt the ledger side could decide on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub success: bool,
    pub ledger_tx_id: Option<String>,
    pub error_message: Option<String>,
}

impl TransferOutcome {
    pub fn completed(ledger_tx_id: impl Into<String>) -> Self {
        Self {
            success: true,
            ledger_tx_id: Some(ledger_tx_id.into()),
            error_message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            ledger_tx_id: None,
            error_message: Some(message.into()),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferServiceError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),
}

impl TransferServiceError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferServiceError::Protocol(e) => e.is_retryable(),
            TransferServiceError::Pricing(_) => false,
        }
    }
}

#[async_trait]
pub trait CirxTransferService: Send + Sync {
    /// Name for logging
    fn name(&self) -> &'static str;

    /// Deliver the settlement amount for `record` to its recipient.
    async fn transfer(
        &self,
        record: &TransactionRecord,
    ) -> Result<TransferOutcome, TransferServiceError>;

    /// Ledger-specific recipient format check, run before any transfer attempt
    fn validate_recipient_address(&self, address: &str) -> bool;

    fn compute_settlement_amount(
        &self,
        amount_paid: Decimal,
        token: PaymentToken,
    ) -> Result<Decimal, TransferServiceError>;
}

/// Sends CIRX from the settlement wallet through the NAG gateway
pub struct LedgerTransferService {
    client: Arc<ProtocolClient>,
    pricing: Arc<dyn SettlementPricing>,
}

impl LedgerTransferService {
    pub fn new(client: Arc<ProtocolClient>, pricing: Arc<dyn SettlementPricing>) -> Self {
        Self { client, pricing }
    }
}

#[async_trait]
impl CirxTransferService for LedgerTransferService {
    fn name(&self) -> &'static str {
        "circular-ledger"
    }

    async fn transfer(
        &self,
        record: &TransactionRecord,
    ) -> Result<TransferOutcome, TransferServiceError> {
        if !self.validate_recipient_address(&record.cirx_recipient_address) {
            return Ok(TransferOutcome::rejected(
                "Invalid Circular Protocol address format",
            ));
        }

        let amount = self.compute_settlement_amount(record.amount_paid, record.payment_token)?;
        if amount <= Decimal::ZERO {
            return Err(PricingError::InvalidAmount(amount.to_string()).into());
        }

        let balance = self.client.own_cirx_balance().await?;
        if balance < amount {
            warn!(
                swap_id = %record.id,
                balance = %balance,
                required = %amount,
                "Settlement wallet balance too low"
            );
            return Ok(TransferOutcome::rejected(format!(
                "Insufficient CIRX balance: have {}, need {}",
                balance, amount
            )));
        }

        let tx_id = self
            .client
            .send_cirx(&record.cirx_recipient_address, amount, &record.id.to_string())
            .await?;

        info!(
            swap_id = %record.id,
            tx_id = %tx_id,
            amount = %amount,
            "CIRX sent"
        );
        Ok(TransferOutcome::completed(tx_id))
    }

    fn validate_recipient_address(&self, address: &str) -> bool {
        codec::is_valid_address(address)
    }

    fn compute_settlement_amount(
        &self,
        amount_paid: Decimal,
        token: PaymentToken,
    ) -> Result<Decimal, TransferServiceError> {
        Ok(self.pricing.settlement_amount(amount_paid, token)?)
    }
}
