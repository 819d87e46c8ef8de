//! Provider-specific webhook handling
//!
//! Signature verification is a pluggable predicate over the raw body and
//! headers; payload field extraction tolerates the shapes each provider
//! actually sends.

use actix_web::http::header::HeaderMap;
use chrono::Utc;

pub const FLUTTERWAVE: &str = "flutterwave";

/// Verifies webhook signatures per provider.
#[derive(Clone)]
pub struct SignatureVerifier {
    flutterwave_secret_hash: Option<String>,
    allow_unverified: bool,
}

impl SignatureVerifier {
    pub fn new(flutterwave_secret_hash: Option<String>, allow_unverified: bool) -> Self {
        Self {
            flutterwave_secret_hash,
            allow_unverified,
        }
    }

    pub fn known_provider(provider: &str) -> bool {
        provider == FLUTTERWAVE
    }

    /// Flutterwave sends the configured secret hash back verbatim in
    /// `verif-hash` (or `x-flw-signature` on older accounts).
    pub fn verify(&self, provider: &str, _raw_body: &[u8], headers: &HeaderMap) -> bool {
        if self.allow_unverified {
            return true;
        }
        match provider {
            FLUTTERWAVE => {
                let Some(secret) = self.flutterwave_secret_hash.as_deref() else {
                    return false;
                };
                header_value(headers, "verif-hash")
                    .or_else(|| header_value(headers, "x-flw-signature"))
                    .is_some_and(|sig| sig == secret)
            }
            _ => false,
        }
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Provider event id from the payload. Events that arrive without an id fall
/// back to a timestamp-derived one, which defeats deduplication for those
/// events; the inbox row is still stored and replayable.
pub fn extract_event_id(payload: &serde_json::Value) -> String {
    match payload.get("id") {
        Some(serde_json::Value::String(id)) if !id.is_empty() => id.clone(),
        Some(serde_json::Value::Number(id)) => id.to_string(),
        _ => format!("flw_{}", Utc::now().timestamp_millis()),
    }
}

/// Transaction reference from the payload, if the provider included one.
pub fn extract_reference(payload: &serde_json::Value) -> Option<String> {
    payload
        .pointer("/data/tx_ref")
        .or_else(|| payload.pointer("/data/reference"))
        .or_else(|| payload.get("txRef"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}
