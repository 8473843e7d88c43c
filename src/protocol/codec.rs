//! Ledger Wire Codec
//!
//! Hex normalization, payload encoding and transaction envelope
//! construction for the Circular Protocol gateway. Everything in here is
//! pure; `client.rs` does the I/O.
//!
//! # Transaction ID
//! ```text
//! ID = sha256_hex(Blockchain ‖ From ‖ To ‖ Payload ‖ Nonce ‖ Timestamp)
//! ```
//! with every hex field passed through [`clean_hex`] first.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::error::ProtocolError;

pub const PROTOCOL_VERSION: &str = "1.0.8";
pub const COIN_TX_TYPE: &str = "C_TYPE_COIN";
pub const CIRX_ASSET: &str = "CIRX";
pub const SEND_ACTION: &str = "CP_SEND";

/// Gateway `Result` value for success
pub const RESULT_OK: i64 = 200;

/// Strip control characters and any `0x` prefixes.
///
/// Idempotent: `clean_hex(clean_hex(x)) == clean_hex(x)`. Case is preserved.
pub fn clean_hex(input: &str) -> String {
    let stripped: String = input
        .chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '\\'))
        .collect();

    let mut rest = stripped.as_str();
    while let Some(tail) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        rest = tail;
    }
    rest.to_string()
}

pub fn string_to_hex(s: &str) -> String {
    hex::encode(s.as_bytes())
}

pub fn hex_to_string(h: &str) -> Result<String, ProtocolError> {
    let bytes = hex::decode(clean_hex(h))
        .map_err(|e| ProtocolError::Decode(format!("invalid hex: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| ProtocolError::Decode(format!("invalid utf-8: {}", e)))
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Circular addresses: 64 hex chars, `0x` optional.
pub fn is_valid_address(address: &str) -> bool {
    let body = address.strip_prefix("0x").unwrap_or(address);
    body.len() == 64 && body.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Gateway timestamp: `YYYY:MM:DD-HH:mm:ss`, UTC, zero-padded.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y:%m:%d-%H:%M:%S").to_string()
}

/// Payload document of a coin transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransferPayload {
    pub action: String,
    pub amount: String,
    pub to: String,
    pub asset: String,
    pub memo: String,
}

impl TransferPayload {
    pub fn cirx_send(to: &str, amount: Decimal, memo: impl Into<String>) -> Self {
        Self {
            action: SEND_ACTION.to_string(),
            amount: amount.normalize().to_string(),
            to: clean_hex(to),
            asset: CIRX_ASSET.to_string(),
            memo: memo.into(),
        }
    }

    /// Hex-encoded JSON, as carried in the envelope's `Payload`
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let json = serde_json::to_string(self)
            .map_err(|e| ProtocolError::Decode(format!("payload encode: {}", e)))?;
        Ok(string_to_hex(&json))
    }

    pub fn decode(payload_hex: &str) -> Result<Self, ProtocolError> {
        let json = hex_to_string(payload_hex)?;
        serde_json::from_str(&json).map_err(|e| ProtocolError::Decode(format!("payload: {}", e)))
    }
}

/// Transaction ID over the cleaned signable fields
pub fn transaction_id(
    blockchain: &str,
    from: &str,
    to: &str,
    payload_hex: &str,
    nonce: u64,
    timestamp: &str,
) -> String {
    let preimage = format!(
        "{}{}{}{}{}{}",
        clean_hex(blockchain),
        clean_hex(from),
        clean_hex(to),
        clean_hex(payload_hex),
        nonce,
        timestamp
    );
    sha256_hex(preimage.as_bytes())
}

/// Signed ledger transaction, field names as on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Type")]
    pub tx_type: String,
    #[serde(rename = "Payload")]
    pub payload: String,
    #[serde(rename = "Nonce")]
    pub nonce: String,
    #[serde(rename = "Signature")]
    pub signature: String,
    #[serde(rename = "Blockchain")]
    pub blockchain: String,
    #[serde(rename = "Version")]
    pub version: String,
}

impl TransactionEnvelope {
    /// Build an envelope with its ID computed and an empty signature.
    pub fn unsigned(
        blockchain: &str,
        from: &str,
        to: &str,
        payload_hex: &str,
        nonce: u64,
        at: DateTime<Utc>,
    ) -> Self {
        let timestamp = format_timestamp(at);
        let id = transaction_id(blockchain, from, to, payload_hex, nonce, &timestamp);
        Self {
            id,
            from: clean_hex(from),
            to: clean_hex(to),
            timestamp,
            tx_type: COIN_TX_TYPE.to_string(),
            payload: clean_hex(payload_hex),
            nonce: nonce.to_string(),
            signature: String::new(),
            blockchain: clean_hex(blockchain),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    /// Bytes covered by `Signature`
    pub fn signing_message(&self) -> &[u8] {
        self.id.as_bytes()
    }

    /// Recompute the ID from the envelope's own fields.
    pub fn id_matches(&self) -> bool {
        match self.nonce.parse::<u64>() {
            Ok(nonce) => {
                transaction_id(
                    &self.blockchain,
                    &self.from,
                    &self.to,
                    &self.payload,
                    nonce,
                    &self.timestamp,
                ) == self.id
            }
            Err(_) => false,
        }
    }
}

/// Request body: `Action` plus the action's own fields
#[derive(Debug, Serialize)]
pub struct GatewayRequest<'a, T: Serialize> {
    #[serde(rename = "Action")]
    pub action: &'a str,
    #[serde(flatten)]
    pub params: T,
}

/// Response body: numeric `Result` and, on success, `Response`
#[derive(Debug, Deserialize)]
pub struct GatewayResponse {
    #[serde(rename = "Result")]
    pub result: i64,
    #[serde(rename = "Response", default)]
    pub response: Option<Value>,
}

impl GatewayResponse {
    /// `Response` if `Result == 200`, otherwise an application error
    pub fn into_result(self) -> Result<Value, ProtocolError> {
        if self.result != RESULT_OK {
            let message = match self.response {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => "no response body".to_string(),
            };
            return Err(ProtocolError::Application {
                code: self.result,
                message,
            });
        }
        Ok(self.response.unwrap_or(Value::Null))
    }
}
