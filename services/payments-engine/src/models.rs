//! Intent, refund, and webhook inbox models plus request/response DTOs
//!
//! Row structs carry status columns as text exactly as stored; the status
//! enums own the legality rules. Wire JSON is camelCase.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Payment intent status. `Settled` is the only state that means "paid".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentIntentStatus {
    Pending,
    Initiated,
    Confirming,
    Settled,
    Failed,
    Expired,
    Refunded,
}

impl PaymentIntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentIntentStatus::Pending => "PENDING",
            PaymentIntentStatus::Initiated => "INITIATED",
            PaymentIntentStatus::Confirming => "CONFIRMING",
            PaymentIntentStatus::Settled => "SETTLED",
            PaymentIntentStatus::Failed => "FAILED",
            PaymentIntentStatus::Expired => "EXPIRED",
            PaymentIntentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentIntentStatus::Settled
                | PaymentIntentStatus::Failed
                | PaymentIntentStatus::Expired
                | PaymentIntentStatus::Refunded
        )
    }

    /// Forward-only transitions. `Settled` is reserved to the settlement
    /// orchestrator and `Refunded` to refund disbursement, so neither is a
    /// legal target here.
    pub fn can_advance_to(&self, target: PaymentIntentStatus) -> bool {
        use PaymentIntentStatus::*;
        matches!(
            (self, target),
            (Pending, Initiated)
                | (Pending, Confirming)
                | (Pending, Failed)
                | (Pending, Expired)
                | (Initiated, Confirming)
                | (Initiated, Failed)
                | (Initiated, Expired)
                | (Confirming, Failed)
        )
    }
}

impl fmt::Display for PaymentIntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentIntentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentIntentStatus::Pending),
            "INITIATED" => Ok(PaymentIntentStatus::Initiated),
            "CONFIRMING" => Ok(PaymentIntentStatus::Confirming),
            "SETTLED" => Ok(PaymentIntentStatus::Settled),
            "FAILED" => Ok(PaymentIntentStatus::Failed),
            "EXPIRED" => Ok(PaymentIntentStatus::Expired),
            "REFUNDED" => Ok(PaymentIntentStatus::Refunded),
            other => Err(format!("unknown payment intent status: {other}")),
        }
    }
}

/// Refund intent status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundIntentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RefundIntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundIntentStatus::Pending => "PENDING",
            RefundIntentStatus::Processing => "PROCESSING",
            RefundIntentStatus::Completed => "COMPLETED",
            RefundIntentStatus::Failed => "FAILED",
        }
    }
}

/// Webhook inbox status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookStatus {
    Received,
    Verified,
    Processed,
    Failed,
    Duplicate,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookStatus::Received => "RECEIVED",
            WebhookStatus::Verified => "VERIFIED",
            WebhookStatus::Processed => "PROCESSED",
            WebhookStatus::Failed => "FAILED",
            WebhookStatus::Duplicate => "DUPLICATE",
        }
    }
}

/// A payment intent row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub id: Uuid,
    pub reference: String,
    pub order_id: String,
    pub amount: Decimal,
    pub original_amount: Decimal,
    pub discount_amount: Decimal,
    pub discount_code: Option<String>,
    pub provider: String,
    pub provider_ref: Option<String>,
    pub currency: String,
    pub metadata: Option<serde_json::Value>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentIntent {
    pub fn status(&self) -> Option<PaymentIntentStatus> {
        self.status.parse().ok()
    }
}

/// A refund intent row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RefundIntent {
    pub id: Uuid,
    pub reference: String,
    pub payment_intent_id: Uuid,
    pub amount: Decimal,
    pub reason: String,
    pub description: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored webhook.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WebhookInboxEntry {
    pub id: Uuid,
    pub provider: String,
    pub provider_event_id: String,
    pub reference: Option<String>,
    pub payload: serde_json::Value,
    pub headers: serde_json::Value,
    pub status: String,
    pub error_message: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Create payment intent request.
#[derive(Debug, Clone, Deserialize, Serialize, validator::Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    #[validate(length(min = 1))]
    pub order_id: String,
    pub amount: Decimal,
    pub original_amount: Decimal,
    pub discount_code: Option<String>,
    #[validate(length(min = 1))]
    pub provider: String,
    pub currency: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Create refund intent request.
#[derive(Debug, Clone, Deserialize, Serialize, validator::Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRefundRequest {
    pub payment_intent_id: Uuid,
    pub amount: Decimal,
    #[validate(length(min = 1))]
    pub reason: String,
    pub description: Option<String>,
}

/// Chain verification request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyChainRequest {
    pub account_id: String,
    pub from_seq: Option<i64>,
    pub to_seq: Option<i64>,
}

/// Ops webhook replay request.
#[derive(Debug, Clone, Deserialize, Serialize, validator::Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReplayWebhookRequest {
    pub webhook_id: Uuid,
    #[validate(length(min = 1))]
    pub reason: String,
}

/// Query parameters of the ledger entry listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryQuery {
    pub account_id: Option<String>,
    pub reference: Option<String>,
    pub order_id: Option<String>,
    pub entry_type: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Response of the webhook ingress and replay endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    pub webhook_id: Uuid,
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_duplicate: Option<bool>,
    pub status: WebhookStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_is_the_only_paid_state_and_terminal() {
        assert!(PaymentIntentStatus::Settled.is_terminal());
        assert!(PaymentIntentStatus::Failed.is_terminal());
        assert!(PaymentIntentStatus::Expired.is_terminal());
        assert!(PaymentIntentStatus::Refunded.is_terminal());
        assert!(!PaymentIntentStatus::Confirming.is_terminal());
    }

    #[test]
    fn transitions_are_forward_only() {
        use PaymentIntentStatus::*;
        assert!(Pending.can_advance_to(Initiated));
        assert!(Pending.can_advance_to(Confirming));
        assert!(Initiated.can_advance_to(Confirming));
        assert!(Confirming.can_advance_to(Failed));

        // backwards and terminal moves are illegal
        assert!(!Confirming.can_advance_to(Pending));
        assert!(!Initiated.can_advance_to(Pending));
        assert!(!Settled.can_advance_to(Confirming));
        assert!(!Failed.can_advance_to(Confirming));

        // SETTLED is never reachable through advance
        assert!(!Confirming.can_advance_to(Settled));
        assert!(!Pending.can_advance_to(Settled));

        // EXPIRED only from the pre-confirmation states
        assert!(Pending.can_advance_to(Expired));
        assert!(Initiated.can_advance_to(Expired));
        assert!(!Confirming.can_advance_to(Expired));
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            PaymentIntentStatus::Pending,
            PaymentIntentStatus::Initiated,
            PaymentIntentStatus::Confirming,
            PaymentIntentStatus::Settled,
            PaymentIntentStatus::Failed,
            PaymentIntentStatus::Expired,
            PaymentIntentStatus::Refunded,
        ] {
            assert_eq!(status.as_str().parse::<PaymentIntentStatus>(), Ok(status));
        }
    }
}
