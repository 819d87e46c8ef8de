//! Reference minting
//!
//! Deterministic derivation of the idempotency references used by payment
//! intents, refund intents, and settlement legs. No I/O, no state.

use sha2::{Digest, Sha256};

/// Reference of a payment intent: `PAYMENT_{orderId}`.
pub fn payment_reference(order_id: &str) -> String {
    format!("PAYMENT_{order_id}")
}

/// Reference of a refund intent: `REFUND_{paymentIntentId}_{sequence}`.
///
/// `sequence` is the count of non-failed refund intents on the payment plus
/// one at the moment of minting; the caller re-reads on conflict.
pub fn refund_reference(payment_intent_id: &str, sequence: u32) -> String {
    format!("REFUND_{payment_intent_id}_{sequence}")
}

/// Reference of the marketing wallet debit leg of a discounted settlement.
pub fn discount_reference(payment_reference: &str) -> String {
    format!("{payment_reference}_DISC")
}

/// Reference of the escrow subsidy credit leg of a discounted settlement.
pub fn discount_escrow_reference(payment_reference: &str) -> String {
    format!("{payment_reference}_DISC_ESCROW")
}

/// A reference is well-formed iff it is non-empty uppercase alphanumeric with
/// underscores: `[A-Z0-9_]+`.
pub fn is_well_formed(reference: &str) -> bool {
    !reference.is_empty()
        && reference
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
}

/// Generic exactly-once key: first 32 hex characters of
/// `sha256(parts.join("|"))`. Not used for ledger references.
pub fn idempotency_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("|").as_bytes());
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(32);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_reference_prefixes_order_id() {
        assert_eq!(payment_reference("O1"), "PAYMENT_O1");
    }

    #[test]
    fn refund_reference_carries_sequence() {
        assert_eq!(refund_reference("ABC123", 1), "REFUND_ABC123_1");
        assert_eq!(refund_reference("ABC123", 2), "REFUND_ABC123_2");
    }

    #[test]
    fn discount_legs_extend_the_payment_reference() {
        assert_eq!(discount_reference("PAYMENT_O2"), "PAYMENT_O2_DISC");
        assert_eq!(
            discount_escrow_reference("PAYMENT_O2"),
            "PAYMENT_O2_DISC_ESCROW"
        );
    }

    #[test]
    fn well_formed_accepts_uppercase_alphanumeric_and_underscore() {
        assert!(is_well_formed("PAYMENT_O1"));
        assert!(is_well_formed("GENESIS_MARKETING_WALLET"));
        assert!(is_well_formed("A0_9Z"));
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("payment_o1"));
        assert!(!is_well_formed("PAYMENT-O1"));
        assert!(!is_well_formed("PAYMENT O1"));
    }

    #[test]
    fn idempotency_key_is_32_hex_and_part_sensitive() {
        let a = idempotency_key(&["settle", "intent-1"]);
        let b = idempotency_key(&["settle", "intent-1"]);
        let c = idempotency_key(&["settle", "intent-2"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[test]
    fn idempotency_key_separator_matters() {
        // ["ab", "c"] and ["a", "bc"] must not collide
        assert_ne!(idempotency_key(&["ab", "c"]), idempotency_key(&["a", "bc"]));
    }
}
