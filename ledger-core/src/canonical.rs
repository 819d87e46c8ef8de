//! Canonical serialization for entry hashing
//!
//! The hash input is a JSON object with a fixed key order:
//! `prevHash, accountId, walletSeq, reference, entryType, amount, description`.
//! Absent `prevHash`/`description` serialize as JSON `null`; the amount
//! serializes as its scale-4 decimal string. The emitter is hand-written so
//! no serializer can reorder keys or reformat whitespace — auditors recompute
//! these bytes independently.

use crate::types::EntryType;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Canonical string form of an amount: exactly four fractional digits.
pub fn amount_string(amount: Decimal) -> String {
    let mut scaled = amount;
    scaled.rescale(4);
    scaled.to_string()
}

fn push_json_string(out: &mut String, value: &str) {
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn push_json_opt_string(out: &mut String, value: Option<&str>) {
    match value {
        Some(s) => push_json_string(out, s),
        None => out.push_str("null"),
    }
}

/// The exact byte sequence fed to SHA-256 for an entry.
#[allow(clippy::too_many_arguments)]
pub fn entry_hash_input(
    prev_hash: Option<&str>,
    account_id: &str,
    wallet_seq: i64,
    reference: &str,
    entry_type: EntryType,
    amount: Decimal,
    description: Option<&str>,
) -> String {
    let mut out = String::with_capacity(192);
    out.push_str("{\"prevHash\":");
    push_json_opt_string(&mut out, prev_hash);
    out.push_str(",\"accountId\":");
    push_json_string(&mut out, account_id);
    out.push_str(",\"walletSeq\":");
    let _ = write!(out, "{wallet_seq}");
    out.push_str(",\"reference\":");
    push_json_string(&mut out, reference);
    out.push_str(",\"entryType\":");
    push_json_string(&mut out, entry_type.as_str());
    out.push_str(",\"amount\":");
    push_json_string(&mut out, &amount_string(amount));
    out.push_str(",\"description\":");
    push_json_opt_string(&mut out, description);
    out.push('}');
    out
}

/// SHA-256 of the canonical form, as 64 lowercase hex characters.
#[allow(clippy::too_many_arguments)]
pub fn entry_hash(
    prev_hash: Option<&str>,
    account_id: &str,
    wallet_seq: i64,
    reference: &str,
    entry_type: EntryType,
    amount: Decimal,
    description: Option<&str>,
) -> String {
    let input = entry_hash_input(
        prev_hash,
        account_id,
        wallet_seq,
        reference,
        entry_type,
        amount,
        description,
    );
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
