use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

use cirx_settlement::money::{format_amount, parse_amount};
use cirx_settlement::protocol::codec::{format_timestamp, is_valid_address, transaction_id};
use cirx_settlement::protocol::{
    LedgerSigner, TransactionEnvelope, TransferPayload, clean_hex, keys_from_seed_phrase,
    sign_message, verify_signature,
};

#[test]
fn qa_clean_hex_is_idempotent() {
    for input in ["0x0xABCdef", "0Xff\n\r", "\\0x12", "plain", "", "0x"] {
        let once = clean_hex(input);
        assert_eq!(clean_hex(&once), once, "input {input:?}");
    }
    assert_eq!(clean_hex("0x0xABCdef"), "ABCdef");
}

#[test]
fn qa_seed_phrase_keys_are_deterministic() {
    let a = keys_from_seed_phrase("correct horse battery staple").unwrap();
    let b = keys_from_seed_phrase("correct horse battery staple").unwrap();
    let c = keys_from_seed_phrase("correct horse battery stapler").unwrap();

    assert_eq!(a.private_key, b.private_key);
    assert_eq!(a.wallet_address, b.wallet_address);
    assert_ne!(a.wallet_address, c.wallet_address);

    // Uncompressed SEC1 point
    assert_eq!(a.public_key.len(), 130);
    assert!(a.public_key.starts_with("04"));
    assert!(is_valid_address(&a.wallet_address));
}

#[test]
fn qa_sign_then_verify() {
    let keys = keys_from_seed_phrase("settlement signing").unwrap();
    let message = b"5f1e1a3b2c4d6e8f";

    let signature = sign_message(message, &keys.private_key).unwrap();
    assert_eq!(signature, signature.to_lowercase());
    assert!(verify_signature(&keys.public_key, message, &signature));
    assert!(verify_signature(
        &format!("0x{}", keys.public_key),
        message,
        &signature
    ));
    assert!(!verify_signature(&keys.public_key, b"tampered", &signature));
    assert!(!verify_signature(&keys.public_key, message, "zz"));
}

#[test]
fn qa_envelope_id_covers_every_field() {
    let signer = LedgerSigner::from_seed_phrase("envelope").unwrap();
    let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
    let payload = TransferPayload::cirx_send("0xAB", Decimal::new(15, 1), "memo")
        .encode()
        .unwrap();
    let envelope = TransactionEnvelope::unsigned("0xchain", signer.wallet_address(), "0xAB", &payload, 3, at);

    assert_eq!(envelope.timestamp, "2024:03:09-07:05:01");
    assert_eq!(envelope.timestamp, format_timestamp(at));
    assert_eq!(
        envelope.id,
        transaction_id("chain", signer.wallet_address(), "AB", &payload, 3, "2024:03:09-07:05:01")
    );
    assert!(envelope.id_matches());

    let mut tampered = envelope.clone();
    tampered.nonce = "4".to_string();
    assert!(!tampered.id_matches());

    let decoded = TransferPayload::decode(&envelope.payload).unwrap();
    assert_eq!(decoded.amount, "1.5");
    assert_eq!(decoded.to, "AB");
}

#[test]
fn qa_amount_precision_is_preserved() {
    for (text, decimals) in [("0.000001", 6), ("1000", 6), ("1.5", 18), ("123456.789", 18)] {
        let units = parse_amount(text, decimals).unwrap();
        let formatted = format_amount(units, decimals).unwrap();
        assert_eq!(
            Decimal::from_str(&formatted).unwrap(),
            Decimal::from_str(text).unwrap()
        );
    }
    assert!(parse_amount("0.0000001", 6).is_err());
}
