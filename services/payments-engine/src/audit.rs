//! Structured audit events
//!
//! Audit records are tracing events on the `audit` target so log shipping can
//! route them separately from operational logs.

use chrono::Utc;
use serde_json::json;
use tracing::info;

pub fn record(event: &str, actor: &str, outcome: &str, details: serde_json::Value) {
    info!(
        target: "audit",
        "{}",
        json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event,
            "actor": actor,
            "outcome": outcome,
            "details": details,
        })
    );
}
