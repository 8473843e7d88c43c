//! Ledger Keys
//!
//! secp256k1 key derivation, wallet addresses and DER signatures.
//! Messages are hashed with SHA-256 before signing.

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use std::fmt;

use super::codec::{clean_hex, sha256_hex};
use super::error::ProtocolError;

/// Hex-encoded key material of one wallet
#[derive(Clone, PartialEq, Eq)]
pub struct WalletKeys {
    pub private_key: String,
    /// Uncompressed SEC1 point (65 bytes)
    pub public_key: String,
    /// SHA-256 of the public key bytes
    pub wallet_address: String,
}

impl fmt::Debug for WalletKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletKeys")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .field("wallet_address", &self.wallet_address)
            .finish()
    }
}

/// Signing identity of the settlement wallet
#[derive(Clone)]
pub struct LedgerSigner {
    signing_key: SigningKey,
    public_key: String,
    wallet_address: String,
}

impl fmt::Debug for LedgerSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerSigner")
            .field("wallet_address", &self.wallet_address)
            .finish_non_exhaustive()
    }
}

impl LedgerSigner {
    fn from_signing_key(signing_key: SigningKey) -> Self {
        let point = signing_key.verifying_key().to_encoded_point(false);
        let public_key = hex::encode(point.as_bytes());
        let wallet_address = sha256_hex(point.as_bytes());
        Self {
            signing_key,
            public_key,
            wallet_address,
        }
    }

    /// Derive from a seed phrase.
    ///
    /// Private key = SHA-256(seed); a digest outside the curve order is
    /// hashed again until it is a valid scalar.
    pub fn from_seed_phrase(seed_phrase: &str) -> Result<Self, ProtocolError> {
        if seed_phrase.trim().is_empty() {
            return Err(ProtocolError::Crypto("seed phrase is empty".to_string()));
        }

        let mut digest = Sha256::digest(seed_phrase.as_bytes());
        loop {
            if let Ok(key) = SigningKey::from_slice(&digest) {
                return Ok(Self::from_signing_key(key));
            }
            digest = Sha256::digest(digest);
        }
    }

    pub fn from_private_key_hex(private_key: &str) -> Result<Self, ProtocolError> {
        let bytes = hex::decode(clean_hex(private_key))
            .map_err(|e| ProtocolError::Crypto(format!("private key is not hex: {}", e)))?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|e| ProtocolError::Crypto(format!("invalid secp256k1 private key: {}", e)))?;
        Ok(Self::from_signing_key(key))
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn wallet_address(&self) -> &str {
        &self.wallet_address
    }

    pub fn keys(&self) -> WalletKeys {
        WalletKeys {
            private_key: hex::encode(self.signing_key.to_bytes()),
            public_key: self.public_key.clone(),
            wallet_address: self.wallet_address.clone(),
        }
    }

    /// ECDSA over SHA-256(message), DER-encoded, lowercase hex
    pub fn sign(&self, message: &[u8]) -> String {
        let signature: Signature = self.signing_key.sign(message);
        hex::encode(signature.to_der().as_bytes())
    }
}

/// Deterministic: the same seed always yields the same keys.
pub fn keys_from_seed_phrase(seed_phrase: &str) -> Result<WalletKeys, ProtocolError> {
    Ok(LedgerSigner::from_seed_phrase(seed_phrase)?.keys())
}

pub fn sign_message(message: &[u8], private_key: &str) -> Result<String, ProtocolError> {
    Ok(LedgerSigner::from_private_key_hex(private_key)?.sign(message))
}

/// Check a DER hex signature against a SEC1 hex public key.
///
/// Malformed keys or signatures verify as `false`.
pub fn verify_signature(public_key: &str, message: &[u8], signature: &str) -> bool {
    let Ok(key_bytes) = hex::decode(clean_hex(public_key)) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(clean_hex(signature)) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(&key_bytes) else {
        return false;
    };
    let Ok(signature) = Signature::from_der(&sig_bytes) else {
        return false;
    };
    verifying_key.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = "test seed phrase for key generation";

    #[test]
    fn test_seed_derivation_is_deterministic() {
        let a = keys_from_seed_phrase(SEED).unwrap();
        let b = keys_from_seed_phrase(SEED).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.private_key, sha256_hex(SEED.as_bytes()));
        assert_eq!(a.public_key.len(), 130);
        assert!(a.public_key.starts_with("04"));
        assert_eq!(a.wallet_address.len(), 64);

        let other = keys_from_seed_phrase("another seed").unwrap();
        assert_ne!(a.wallet_address, other.wallet_address);
    }

    #[test]
    fn test_private_key_import_matches_seed() {
        let from_seed = keys_from_seed_phrase(SEED).unwrap();
        let imported =
            LedgerSigner::from_private_key_hex(&format!("0x{}", from_seed.private_key)).unwrap();
        assert_eq!(imported.keys(), from_seed);
    }

    #[test]
    fn test_invalid_keys_are_crypto_errors() {
        assert!(matches!(
            LedgerSigner::from_private_key_hex("zz"),
            Err(ProtocolError::Crypto(_))
        ));
        assert!(matches!(
            LedgerSigner::from_private_key_hex(&"0".repeat(64)),
            Err(ProtocolError::Crypto(_))
        ));
        assert!(matches!(
            LedgerSigner::from_seed_phrase("   "),
            Err(ProtocolError::Crypto(_))
        ));
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = LedgerSigner::from_seed_phrase(SEED).unwrap();
        let signature = signer.sign(b"Test message for verification");

        assert!(signature.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(signature.starts_with("30"));
        assert!(verify_signature(
            signer.public_key(),
            b"Test message for verification",
            &signature
        ));
        assert!(!verify_signature(signer.public_key(), b"Wrong message", &signature));
        assert!(!verify_signature(signer.public_key(), b"x", "not-hex"));
    }

    #[test]
    fn test_sign_message_with_raw_key() {
        let keys = keys_from_seed_phrase(SEED).unwrap();
        let signature = sign_message(b"abc", &keys.private_key).unwrap();
        assert!(verify_signature(&keys.public_key, b"abc", &signature));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let keys = keys_from_seed_phrase(SEED).unwrap();
        let rendered = format!("{:?}", keys);
        assert!(!rendered.contains(&keys.private_key));
    }
}
