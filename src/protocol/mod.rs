//! Circular Protocol
//!
//! Key derivation, signing, envelope encoding and the gateway client used
//! to deliver CIRX.

pub mod client;
pub mod codec;
pub mod error;
pub mod keys;

pub use client::{LedgerNetwork, ProtocolClient};
pub use codec::{TransactionEnvelope, TransferPayload, clean_hex};
pub use error::ProtocolError;
pub use keys::{LedgerSigner, WalletKeys, keys_from_seed_phrase, sign_message, verify_signature};
