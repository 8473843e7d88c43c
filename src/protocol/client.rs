//! Ledger Gateway Client
//!
//! All reads and writes go through one HTTP endpoint (the NAG); the JSON
//! body's `Action` selects the handler.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, trace};

use super::codec::{
    CIRX_ASSET, GatewayRequest, GatewayResponse, PROTOCOL_VERSION, TransactionEnvelope,
    TransferPayload, clean_hex,
};
use super::error::ProtocolError;
use super::keys::LedgerSigner;
use crate::logging::WIRE_TARGET;

pub const ACTION_GET_WALLET_NONCE: &str = "Circular_GetWalletNonce_";
pub const ACTION_GET_WALLET_BALANCE: &str = "Circular_GetWalletBalance_";
pub const ACTION_GET_TRANSACTION: &str = "Circular_GetTransactionbyID_";
pub const ACTION_GET_BLOCK_COUNT: &str = "Circular_GetBlockCount_";
pub const ACTION_ADD_TRANSACTION: &str = "Circular_AddTransaction_";

/// Error text when no settlement wallet signer was loaded
pub const WALLET_NOT_CONFIGURED: &str = "CIRX wallet not configured";

/// Circular Protocol networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerNetwork {
    Mainnet,
    Staging,
    Sandbox,
}

impl LedgerNetwork {
    pub fn blockchain_id(&self) -> &'static str {
        match self {
            LedgerNetwork::Mainnet => {
                "714d2ac07a826b66ac56752eebd7c77b58d2ee842e523d913fd0ef06e6bdfcae"
            }
            LedgerNetwork::Staging => {
                "acb8a9b79f3c663aa01be852cd42725f9e0e497fd849b436df51c5e074ebeb28"
            }
            LedgerNetwork::Sandbox => {
                "8a20baa40c45dc5055aeb26197c203e576ef389d9acb171bd62da11dc5ad72b2"
            }
        }
    }

    pub fn default_gateway_url(&self) -> &'static str {
        match self {
            LedgerNetwork::Mainnet => "https://nag.circularlabs.io/NAG_Mainnet.php?cep=",
            LedgerNetwork::Staging | LedgerNetwork::Sandbox => {
                "https://nag.circularlabs.io/NAG.php?cep="
            }
        }
    }
}

/// Gateway client, optionally holding the settlement wallet's signer
pub struct ProtocolClient {
    http: reqwest::Client,
    gateway_url: String,
    blockchain: String,
    signer: Option<LedgerSigner>,
}

impl ProtocolClient {
    pub fn new(
        gateway_url: impl Into<String>,
        blockchain: &str,
        timeout: Duration,
        signer: Option<LedgerSigner>,
    ) -> Result<Self, ProtocolError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ProtocolError::Transport(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            gateway_url: gateway_url.into(),
            blockchain: clean_hex(blockchain),
            signer,
        })
    }

    pub fn blockchain(&self) -> &str {
        &self.blockchain
    }

    pub fn wallet_address(&self) -> Option<&str> {
        self.signer.as_ref().map(|s| s.wallet_address())
    }

    fn signer(&self) -> Result<&LedgerSigner, ProtocolError> {
        self.signer
            .as_ref()
            .ok_or_else(|| ProtocolError::Crypto(WALLET_NOT_CONFIGURED.to_string()))
    }

    /// POST one action and return `Response` after the `Result == 200` check.
    async fn call<T: Serialize>(&self, action: &str, params: T) -> Result<Value, ProtocolError> {
        let request = GatewayRequest { action, params };

        let response = self
            .http
            .post(&self.gateway_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: GatewayResponse = response.json().await?;
        trace!(target: WIRE_TARGET, action, response = ?body.response, "Gateway response");
        debug!(action, result = body.result, "Gateway call");
        body.into_result()
    }

    pub async fn get_wallet_nonce(&self, address: &str) -> Result<u64, ProtocolError> {
        let response = self
            .call(
                ACTION_GET_WALLET_NONCE,
                json!({
                    "Blockchain": self.blockchain,
                    "Address": clean_hex(address),
                    "Version": PROTOCOL_VERSION,
                }),
            )
            .await?;
        field_as_u64(&response, "Nonce")
    }

    pub async fn get_wallet_balance(
        &self,
        address: &str,
        asset: &str,
    ) -> Result<Decimal, ProtocolError> {
        let response = self
            .call(
                ACTION_GET_WALLET_BALANCE,
                json!({
                    "Blockchain": self.blockchain,
                    "Address": clean_hex(address),
                    "Asset": asset,
                    "Version": PROTOCOL_VERSION,
                }),
            )
            .await?;
        field_as_decimal(&response, "Balance")
    }

    /// `None` when the gateway has no transaction with this id yet
    pub async fn get_transaction_by_id(
        &self,
        tx_id: &str,
    ) -> Result<Option<Value>, ProtocolError> {
        let response = self
            .call(
                ACTION_GET_TRANSACTION,
                json!({
                    "Blockchain": self.blockchain,
                    "ID": clean_hex(tx_id),
                    "Start": "0",
                    "End": "0",
                    "Version": PROTOCOL_VERSION,
                }),
            )
            .await?;
        Ok(match response {
            Value::Null => None,
            Value::String(ref s) if s.contains("Transaction Not Found") => None,
            other => Some(other),
        })
    }

    pub async fn get_block_count(&self) -> Result<u64, ProtocolError> {
        let response = self
            .call(
                ACTION_GET_BLOCK_COUNT,
                json!({
                    "Blockchain": self.blockchain,
                    "Version": PROTOCOL_VERSION,
                }),
            )
            .await?;
        match response {
            Value::Object(_) => field_as_u64(&response, "Blocks"),
            other => value_as_u64(&other, "Blocks"),
        }
    }

    /// Submit a signed envelope; returns the ledger tx id.
    pub async fn submit_transaction(
        &self,
        envelope: &TransactionEnvelope,
    ) -> Result<String, ProtocolError> {
        let response = self.call(ACTION_ADD_TRANSACTION, envelope).await?;
        let tx_id = response
            .get("TxID")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| envelope.id.clone());
        Ok(tx_id)
    }

    /// Build and sign a CIRX transfer from the settlement wallet.
    pub fn build_transfer(
        &self,
        to: &str,
        amount: Decimal,
        memo: &str,
        nonce: u64,
        at: DateTime<Utc>,
    ) -> Result<TransactionEnvelope, ProtocolError> {
        let signer = self.signer()?;
        let payload = TransferPayload::cirx_send(to, amount, memo).encode()?;
        let mut envelope = TransactionEnvelope::unsigned(
            &self.blockchain,
            signer.wallet_address(),
            to,
            &payload,
            nonce,
            at,
        );
        envelope.signature = signer.sign(envelope.signing_message());
        Ok(envelope)
    }

    /// Send CIRX to `to`; returns the ledger tx id.
    ///
    /// Uses the wallet nonce reported by the gateway plus one.
    pub async fn send_cirx(
        &self,
        to: &str,
        amount: Decimal,
        memo: &str,
    ) -> Result<String, ProtocolError> {
        let from = self.signer()?.wallet_address().to_string();
        let nonce = self.get_wallet_nonce(&from).await? + 1;
        let envelope = self.build_transfer(to, amount, memo, nonce, Utc::now())?;

        let tx_id = self.submit_transaction(&envelope).await?;
        info!(
            tx_id = %tx_id,
            to = %envelope.to,
            amount = %amount,
            nonce,
            "CIRX transfer submitted"
        );
        Ok(tx_id)
    }

    /// Balance of the settlement wallet
    pub async fn own_cirx_balance(&self) -> Result<Decimal, ProtocolError> {
        let address = self.signer()?.wallet_address().to_string();
        self.get_wallet_balance(&address, CIRX_ASSET).await
    }
}

fn field<'a>(response: &'a Value, name: &str) -> Result<&'a Value, ProtocolError> {
    response
        .get(name)
        .ok_or_else(|| ProtocolError::Decode(format!("missing {} in response", name)))
}

fn value_as_u64(value: &Value, name: &str) -> Result<u64, ProtocolError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        ProtocolError::Decode(format!("{} is not an unsigned integer: {}", name, value))
    })
}

fn field_as_u64(response: &Value, name: &str) -> Result<u64, ProtocolError> {
    value_as_u64(field(response, name)?, name)
}

fn field_as_decimal(response: &Value, name: &str) -> Result<Decimal, ProtocolError> {
    let value = field(response, name)?;
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => String::new(),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| ProtocolError::Decode(format!("{} is not a decimal: {}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::keys::verify_signature;
    use chrono::TimeZone;

    fn client_with_signer() -> ProtocolClient {
        let signer = LedgerSigner::from_seed_phrase("settlement wallet").unwrap();
        ProtocolClient::new(
            "http://127.0.0.1:1/nag",
            LedgerNetwork::Sandbox.blockchain_id(),
            Duration::from_secs(1),
            Some(signer),
        )
        .unwrap()
    }

    #[test]
    fn test_build_transfer_is_signed_over_id() {
        let client = client_with_signer();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let to = format!("0x{}", "c".repeat(64));
        let envelope = client
            .build_transfer(&to, Decimal::from(400), "swap-1", 8, at)
            .unwrap();

        assert!(envelope.id_matches());
        assert_eq!(envelope.to, "c".repeat(64));
        assert_eq!(envelope.nonce, "8");
        assert_eq!(envelope.timestamp, "2024:05:01-12:00:00");
        assert_eq!(envelope.blockchain, LedgerNetwork::Sandbox.blockchain_id());

        let signer = client.signer().unwrap();
        assert!(verify_signature(
            signer.public_key(),
            envelope.signing_message(),
            &envelope.signature
        ));

        let payload = TransferPayload::decode(&envelope.payload).unwrap();
        assert_eq!(payload.amount, "400");
        assert_eq!(payload.memo, "swap-1");
    }

    #[test]
    fn test_build_transfer_without_wallet_is_crypto_error() {
        let client = ProtocolClient::new(
            "http://127.0.0.1:1/nag",
            LedgerNetwork::Sandbox.blockchain_id(),
            Duration::from_secs(1),
            None,
        )
        .unwrap();
        let err = client
            .build_transfer("aa", Decimal::ONE, "", 1, Utc::now())
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Crypto(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_response_field_parsing() {
        let response = json!({"Nonce": "12", "Balance": 1500.25});
        assert_eq!(field_as_u64(&response, "Nonce").unwrap(), 12);
        assert_eq!(
            field_as_decimal(&response, "Balance").unwrap(),
            Decimal::from_str("1500.25").unwrap()
        );
        assert!(matches!(
            field_as_u64(&response, "Missing"),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_transport_error() {
        let client = client_with_signer();
        let err = client.get_block_count().await.unwrap_err();
        assert!(matches!(err, ProtocolError::Transport(_)));
        assert!(err.is_retryable());
    }
}
