//! EVM Payment Verifier
//!
//! Confirms deposits on Ethereum-compatible chains over JSON-RPC:
//! receipt status, confirmations, recipient and amount (native value or
//! ERC-20 `Transfer` log).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::verification::{PaymentVerificationService, VerificationError, VerificationVerdict};
use crate::config::ChainConfig;
use crate::money;
use crate::swap::{PaymentChain, TransactionRecord};

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

#[derive(Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: &'static str,
    method: &'static str,
    params: T,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EvmTransaction {
    pub hash: String,
    pub to: Option<String>,
    pub value: String,
    pub block_number: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EvmReceipt {
    pub status: Option<String>,
    pub block_number: Option<String>,
    #[serde(default)]
    pub logs: Vec<EvmLog>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct EvmLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

/// Parse an RPC quantity (`0x…`) into `u128`.
pub fn parse_hex_u128(value: &str) -> Result<u128, VerificationError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }
    if digits.len() > 32 {
        return Err(VerificationError::Decode(format!(
            "quantity exceeds 128 bits: {}",
            value
        )));
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| VerificationError::Decode(format!("bad hex quantity {}: {}", value, e)))
}

/// Parse a block number; quantities past `u64` are a decode error.
pub fn parse_hex_u64(value: &str) -> Result<u64, VerificationError> {
    u64::try_from(parse_hex_u128(value)?).map_err(|_| {
        VerificationError::Decode(format!("block number exceeds 64 bits: {}", value))
    })
}

/// Address held in an indexed log topic (last 20 bytes), lowercase with `0x`.
pub fn topic_address(topic: &str) -> String {
    let digits = topic.strip_prefix("0x").unwrap_or(topic);
    let start = digits.len().saturating_sub(40);
    format!("0x{}", digits.get(start..).unwrap_or(digits).to_lowercase())
}

fn same_address(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Judge a fetched transaction against the record.
///
/// `head` is the latest block number.
pub fn evaluate_deposit(
    record: &TransactionRecord,
    chain: &ChainConfig,
    tx: &EvmTransaction,
    receipt: &EvmReceipt,
    head: u64,
) -> Result<VerificationVerdict, VerificationError> {
    if receipt.status.as_deref() != Some("0x1") {
        return Ok(VerificationVerdict::invalid(
            "Transaction failed on blockchain",
        ));
    }

    let Some(block_hex) = receipt.block_number.as_ref().or(tx.block_number.as_ref()) else {
        return Ok(VerificationVerdict::invalid("Transaction not yet mined"));
    };
    let block = parse_hex_u64(block_hex)?;
    let confirmations = head.saturating_sub(block);
    let required = chain.confirmations();
    if confirmations < required {
        return Ok(VerificationVerdict::invalid(format!(
            "Insufficient confirmations: {} (required: {})",
            confirmations, required
        )));
    }

    let token = record.payment_token;
    let tx_to = tx.to.as_deref().unwrap_or_default();
    let received_units = if token == chain.chain.native_token() {
        if !same_address(tx_to, &chain.project_wallet) {
            return Ok(VerificationVerdict::invalid(format!(
                "Payment sent to wrong address: {} (expected: {})",
                tx_to, chain.project_wallet
            )));
        }
        parse_hex_u128(&tx.value)?
    } else {
        let contract = chain.token_contracts.get(&token).ok_or_else(|| {
            VerificationError::ChainNotConfigured(format!("{} on {}", token, chain.chain))
        })?;
        if !same_address(tx_to, contract) {
            return Ok(VerificationVerdict::invalid(format!(
                "Transaction is not a {} transfer",
                token
            )));
        }
        let transfer = receipt.logs.iter().find(|log| {
            same_address(&log.address, contract)
                && log.topics.len() >= 3
                && log.topics[0].eq_ignore_ascii_case(TRANSFER_TOPIC)
                && same_address(&topic_address(&log.topics[2]), &chain.project_wallet)
        });
        let Some(log) = transfer else {
            return Ok(VerificationVerdict::invalid(format!(
                "Payment sent to wrong address: no {} transfer to {}",
                token, chain.project_wallet
            )));
        };
        parse_hex_u128(&log.data)?
    };

    let received = money::to_decimal(received_units, token.decimals())
        .map_err(|e| VerificationError::Decode(e.to_string()))?;
    if received < record.amount_paid {
        return Ok(VerificationVerdict::invalid(format!(
            "Insufficient payment amount: received {}, expected {}",
            received.normalize(),
            record.amount_paid
        )));
    }

    Ok(VerificationVerdict::valid())
}

pub struct EvmPaymentVerifier {
    http: reqwest::Client,
    chains: HashMap<PaymentChain, ChainConfig>,
}

impl EvmPaymentVerifier {
    pub fn new(chains: &[ChainConfig], timeout: Duration) -> Result<Self, VerificationError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                VerificationError::Transport(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            http,
            chains: chains.iter().map(|c| (c.chain, c.clone())).collect(),
        })
    }

    /// JSON-RPC call; `Ok(None)` for a `null` result
    async fn rpc_call<T, R>(
        &self,
        url: &str,
        method: &'static str,
        params: T,
    ) -> Result<Option<R>, VerificationError>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| VerificationError::Transport(format!("HTTP request failed: {}", e)))?;

        let rpc_response: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| VerificationError::Decode(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = rpc_response.error {
            return Err(VerificationError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(rpc_response.result)
    }
}

#[async_trait]
impl PaymentVerificationService for EvmPaymentVerifier {
    fn name(&self) -> &'static str {
        "evm"
    }

    async fn verify(
        &self,
        record: &TransactionRecord,
    ) -> Result<VerificationVerdict, VerificationError> {
        let chain = self
            .chains
            .get(&record.payment_chain)
            .ok_or_else(|| VerificationError::ChainNotConfigured(record.payment_chain.to_string()))?;
        let url = chain.rpc_url.as_str();

        let tx: Option<EvmTransaction> = self
            .rpc_call(url, "eth_getTransactionByHash", json!([record.payment_tx_id]))
            .await?;
        let Some(tx) = tx else {
            return Ok(VerificationVerdict::invalid(format!(
                "Transaction not found on {}",
                record.payment_chain
            )));
        };

        let receipt: Option<EvmReceipt> = self
            .rpc_call(url, "eth_getTransactionReceipt", json!([record.payment_tx_id]))
            .await?;
        let Some(receipt) = receipt else {
            return Ok(VerificationVerdict::invalid("Transaction not yet mined"));
        };

        let head: Option<String> = self.rpc_call(url, "eth_blockNumber", json!([])).await?;
        let head = head
            .ok_or_else(|| VerificationError::Decode("eth_blockNumber returned null".to_string()))?;
        let head = parse_hex_u64(&head)?;

        debug!(
            swap_id = %record.id,
            tx_hash = %tx.hash,
            head,
            "Evaluating deposit"
        );
        evaluate_deposit(record, chain, &tx, &receipt, head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::types::fixtures::{deposit_hash, new_swap};
    use crate::swap::{PaymentToken, TransactionRecord};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const WALLET: &str = "0x834244d016f29d6acb42c1b054a88e2e9b1c9228";
    const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

    fn chain() -> ChainConfig {
        ChainConfig {
            chain: PaymentChain::Ethereum,
            rpc_url: "http://localhost:8545".to_string(),
            project_wallet: WALLET.to_string(),
            required_confirmations: None,
            token_contracts: HashMap::from([(PaymentToken::Usdc, USDC.to_string())]),
        }
    }

    fn usdc_record(amount: &str) -> TransactionRecord {
        let mut swap = new_swap(&deposit_hash(1));
        swap.amount_paid = Decimal::from_str(amount).unwrap();
        TransactionRecord::new(swap, Utc::now())
    }

    fn usdc_transfer(units: u128) -> (EvmTransaction, EvmReceipt) {
        let tx = EvmTransaction {
            hash: deposit_hash(1),
            to: Some(USDC.to_string()),
            value: "0x0".to_string(),
            block_number: Some("0x64".to_string()),
        };
        let receipt = EvmReceipt {
            status: Some("0x1".to_string()),
            block_number: Some("0x64".to_string()),
            logs: vec![EvmLog {
                address: USDC.to_string(),
                topics: vec![
                    TRANSFER_TOPIC.to_string(),
                    format!("0x{:0>64}", "742d35cc6634c0532925a3b844bc454e4438f44e"),
                    format!("0x{:0>64}", &WALLET[2..]),
                ],
                data: format!("0x{:064x}", units),
            }],
        };
        (tx, receipt)
    }

    #[test]
    fn test_parse_hex_quantities() {
        assert_eq!(parse_hex_u128("0x0").unwrap(), 0);
        assert_eq!(parse_hex_u128("0x").unwrap(), 0);
        assert_eq!(parse_hex_u128("0x16345785d8a0000").unwrap(), 100_000_000_000_000_000);
        assert_eq!(parse_hex_u128(&format!("0x{:064x}", 5u8)).unwrap(), 5);
        assert!(parse_hex_u128(&format!("0x1{}", "0".repeat(32))).is_err());
        assert!(parse_hex_u128("0xzz").is_err());

        assert_eq!(parse_hex_u64("0x120").unwrap(), 288);
        assert_eq!(parse_hex_u64("0xffffffffffffffff").unwrap(), u64::MAX);
        assert!(matches!(
            parse_hex_u64("0x10000000000000000"),
            Err(VerificationError::Decode(_))
        ));
    }

    #[test]
    fn test_topic_address() {
        assert_eq!(
            topic_address(&format!("0x{:0>64}", "834244D016F29D6ACB42C1B054A88E2E9B1C9228")),
            WALLET
        );
    }

    #[test]
    fn test_erc20_deposit_verified() {
        let (tx, receipt) = usdc_transfer(1_000_000_000);
        let verdict = evaluate_deposit(&usdc_record("1000"), &chain(), &tx, &receipt, 120).unwrap();
        assert_eq!(verdict, VerificationVerdict::valid());
    }

    #[test]
    fn test_insufficient_confirmations() {
        let (tx, receipt) = usdc_transfer(1_000_000_000);
        let verdict = evaluate_deposit(&usdc_record("1000"), &chain(), &tx, &receipt, 105).unwrap();
        assert_eq!(
            verdict.reason.as_deref(),
            Some("Insufficient confirmations: 5 (required: 12)")
        );
    }

    #[test]
    fn test_oversized_block_number_is_decode_error() {
        let (tx, mut receipt) = usdc_transfer(1_000_000_000);
        receipt.block_number = Some("0x10000000000000064".to_string());
        assert!(matches!(
            evaluate_deposit(&usdc_record("1000"), &chain(), &tx, &receipt, 120),
            Err(VerificationError::Decode(_))
        ));
    }

    #[test]
    fn test_underpayment_rejected() {
        let (tx, receipt) = usdc_transfer(999_999_999);
        let verdict = evaluate_deposit(&usdc_record("1000"), &chain(), &tx, &receipt, 200).unwrap();
        assert!(!verdict.is_valid);
        assert!(verdict.reason.unwrap().starts_with("Insufficient payment amount"));
    }

    #[test]
    fn test_failed_receipt_and_wrong_recipient() {
        let (tx, mut receipt) = usdc_transfer(1_000_000_000);
        receipt.status = Some("0x0".to_string());
        let verdict = evaluate_deposit(&usdc_record("1"), &chain(), &tx, &receipt, 200).unwrap();
        assert_eq!(verdict.reason.as_deref(), Some("Transaction failed on blockchain"));

        let (tx, mut receipt) = usdc_transfer(1_000_000_000);
        receipt.logs[0].topics[2] = format!("0x{:0>64}", "1111111111111111111111111111111111111111");
        let verdict = evaluate_deposit(&usdc_record("1"), &chain(), &tx, &receipt, 200).unwrap();
        assert!(verdict.reason.unwrap().starts_with("Payment sent to wrong address"));
    }

    #[test]
    fn test_native_eth_deposit() {
        let mut swap = new_swap(&deposit_hash(2));
        swap.payment_token = PaymentToken::Eth;
        swap.amount_paid = Decimal::from_str("0.1").unwrap();
        let record = TransactionRecord::new(swap, Utc::now());

        let tx = EvmTransaction {
            hash: deposit_hash(2),
            to: Some(WALLET.to_uppercase().replacen("0X", "0x", 1)),
            value: "0x16345785d8a0000".to_string(),
            block_number: Some("0x10".to_string()),
        };
        let receipt = EvmReceipt {
            status: Some("0x1".to_string()),
            block_number: Some("0x10".to_string()),
            logs: vec![],
        };
        assert!(evaluate_deposit(&record, &chain(), &tx, &receipt, 100).unwrap().is_valid);
    }

    #[test]
    fn test_unconfigured_token_is_error() {
        let mut swap = new_swap(&deposit_hash(3));
        swap.payment_token = PaymentToken::Usdt;
        let record = TransactionRecord::new(swap, Utc::now());
        let (tx, receipt) = usdc_transfer(1);
        assert!(matches!(
            evaluate_deposit(&record, &chain(), &tx, &receipt, 200),
            Err(VerificationError::ChainNotConfigured(_))
        ));
    }
}
