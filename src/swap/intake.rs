//! Swap Intake
//!
//! Entry points for the inbound handler and status callers.

use chrono::Utc;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{info, warn};

use super::error::SwapError;
use super::store::TransactionStore;
use super::types::{NewSwap, PaymentChain, PaymentToken, SwapId, TransactionRecord};
use crate::money;
use crate::protocol::codec;

/// Raw swap request as received from the inbound handler
#[derive(Debug, Clone)]
pub struct SwapRequest {
    pub deposit_tx_id: String,
    pub source_chain: String,
    pub recipient_address: String,
    pub amount_paid: String,
    pub payment_token: String,
    pub sender_address: Option<String>,
}

/// Deposit tx hashes: `0x` + 64 hex chars, not a single repeated digit.
pub fn is_valid_deposit_tx_id(tx_id: &str) -> bool {
    let Some(body) = tx_id.strip_prefix("0x") else {
        return false;
    };
    if body.len() != 64 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return false;
    }
    let first = body.as_bytes()[0].to_ascii_lowercase();
    !body.bytes().all(|b| b.to_ascii_lowercase() == first)
}

/// Check a request and turn it into typed creation parameters.
pub fn validate_request(request: &SwapRequest) -> Result<NewSwap, SwapError> {
    if request.deposit_tx_id.is_empty() {
        return Err(SwapError::invalid("deposit_tx_id", "transaction id is required"));
    }
    if !is_valid_deposit_tx_id(&request.deposit_tx_id) {
        return Err(SwapError::invalid(
            "deposit_tx_id",
            "invalid transaction id format",
        ));
    }

    let payment_chain = PaymentChain::from_str(&request.source_chain)?;
    let payment_token = PaymentToken::from_str(&request.payment_token)?;

    if !codec::is_valid_address(&request.recipient_address) {
        return Err(SwapError::invalid(
            "cirx_recipient_address",
            "invalid CIRX recipient address format",
        ));
    }

    let amount_paid = Decimal::from_str(request.amount_paid.trim())
        .map_err(|_| SwapError::invalid("amount_paid", "amount paid must be a decimal number"))?;
    money::parse_decimal(amount_paid, payment_token.decimals())
        .map_err(|e| SwapError::invalid("amount_paid", e.to_string()))?;

    Ok(NewSwap {
        payment_tx_id: request.deposit_tx_id.to_lowercase(),
        payment_chain,
        payment_token,
        cirx_recipient_address: request.recipient_address.clone(),
        amount_paid,
        sender_address: request.sender_address.clone(),
    })
}

/// Create a swap in `pending_payment_verification`.
///
/// A deposit id that was already submitted is rejected with
/// `DuplicateDeposit` and the existing record is not touched.
pub async fn create_pending_transaction(
    store: &dyn TransactionStore,
    request: &SwapRequest,
) -> Result<TransactionRecord, SwapError> {
    let swap = validate_request(request)?;

    if store.get_by_payment_tx_id(&swap.payment_tx_id).await?.is_some() {
        warn!(payment_tx_id = %swap.payment_tx_id, "Duplicate deposit rejected");
        return Err(SwapError::DuplicateDeposit(swap.payment_tx_id));
    }

    let record = TransactionRecord::new(swap, Utc::now());
    store.insert(&record).await?;

    info!(
        swap_id = %record.id,
        payment_tx_id = %record.payment_tx_id,
        chain = %record.payment_chain,
        token = %record.payment_token,
        amount = %record.amount_paid,
        "Swap created"
    );
    Ok(record)
}

/// Current state of a swap, including `failure_reason` for terminal failures.
pub async fn get_transaction(
    store: &dyn TransactionStore,
    id: &str,
) -> Result<TransactionRecord, SwapError> {
    let swap_id = SwapId::from_str(id).map_err(|_| SwapError::NotFound(id.to_string()))?;
    store
        .get(swap_id)
        .await?
        .ok_or_else(|| SwapError::NotFound(id.to_string()))
}
