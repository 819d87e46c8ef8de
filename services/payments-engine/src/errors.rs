//! Service error taxonomy and HTTP envelope
//!
//! Every caller-visible failure renders as `{code, message, details?}` with
//! the error kind as `code`. Idempotent replays (duplicate webhook, existing
//! intent) are success paths and never reach this type.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, PaymentsError>;

#[derive(Error, Debug)]
pub enum PaymentsError {
    #[error("Amount must be positive")]
    InvalidAmount(Decimal),

    #[error("Original amount {original} is less than charged amount {amount}")]
    InvalidAmounts { amount: Decimal, original: Decimal },

    #[error("Discount amount cannot be negative")]
    InvalidDiscount(Decimal),

    #[error("A discount code is required when a discount is applied")]
    DiscountCodeRequired,

    #[error("Payment intent not found: {0}")]
    IntentNotFound(String),

    #[error("Intent is {current}, settlement requires {required}")]
    InvalidStatusForSettlement {
        current: String,
        required: &'static str,
    },

    #[error("Illegal status transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Payment {0} is not settled; refunds require a settled payment")]
    PaymentNotSettled(Uuid),

    #[error("Refund of {requested} exceeds remaining refundable amount {remaining}")]
    RefundExceedsRemaining {
        requested: Decimal,
        remaining: Decimal,
    },

    #[error("Webhook not found: {0}")]
    WebhookNotFound(Uuid),

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Unknown webhook provider: {0}")]
    UnknownProvider(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Settlement transaction exceeded its time budget")]
    SettlementTimeout,

    #[error(transparent)]
    Ledger(#[from] ledger_core::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl PaymentsError {
    /// Stable error code of the envelope.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentsError::InvalidAmount(_) => "INVALID_AMOUNT",
            PaymentsError::InvalidAmounts { .. } => "INVALID_AMOUNTS",
            PaymentsError::InvalidDiscount(_) => "INVALID_DISCOUNT",
            PaymentsError::DiscountCodeRequired => "DISCOUNT_CODE_REQUIRED",
            PaymentsError::IntentNotFound(_) => "INTENT_NOT_FOUND",
            PaymentsError::InvalidStatusForSettlement { .. } => "INVALID_STATUS_FOR_SETTLEMENT",
            PaymentsError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            PaymentsError::PaymentNotSettled(_) => "PAYMENT_NOT_SETTLED",
            PaymentsError::RefundExceedsRemaining { .. } => "REFUND_EXCEEDS_REMAINING",
            PaymentsError::WebhookNotFound(_) => "WEBHOOK_NOT_FOUND",
            PaymentsError::WalletNotFound(_) => "WALLET_NOT_FOUND",
            PaymentsError::UnknownProvider(_) => "UNKNOWN_PROVIDER",
            PaymentsError::Validation(_) => "VALIDATION_ERROR",
            PaymentsError::SettlementTimeout => "SETTLEMENT_TIMEOUT",
            PaymentsError::Ledger(err) => match err {
                ledger_core::Error::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
                ledger_core::Error::DebitOnNonExistentWallet(_) => "DEBIT_ON_NON_EXISTENT_WALLET",
                ledger_core::Error::SerializationFailure => "SERIALIZATION_FAILURE",
                ledger_core::Error::InvalidReference(_) => "INVALID_REFERENCE",
                ledger_core::Error::InvalidAmount(_) => "INVALID_AMOUNT",
                ledger_core::Error::Database(_) => "INTERNAL_ERROR",
            },
            PaymentsError::Database(_) => "INTERNAL_ERROR",
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            PaymentsError::InvalidAmounts { amount, original } => Some(json!({
                "amount": amount.to_string(),
                "originalAmount": original.to_string(),
            })),
            PaymentsError::InvalidStatusForSettlement { current, required } => Some(json!({
                "current": current,
                "required": required,
            })),
            PaymentsError::IllegalTransition { from, to } => Some(json!({
                "from": from,
                "to": to,
            })),
            PaymentsError::RefundExceedsRemaining {
                requested,
                remaining,
            } => Some(json!({
                "requested": requested.to_string(),
                "remaining": remaining.to_string(),
            })),
            PaymentsError::Ledger(ledger_core::Error::InsufficientBalance {
                account_id,
                balance,
                amount,
            }) => Some(json!({
                "accountId": account_id,
                "balance": balance.to_string(),
                "amount": amount.to_string(),
            })),
            _ => None,
        }
    }
}

impl ResponseError for PaymentsError {
    fn status_code(&self) -> StatusCode {
        match self {
            PaymentsError::InvalidAmount(_)
            | PaymentsError::InvalidAmounts { .. }
            | PaymentsError::InvalidDiscount(_)
            | PaymentsError::DiscountCodeRequired
            | PaymentsError::UnknownProvider(_)
            | PaymentsError::Validation(_) => StatusCode::BAD_REQUEST,
            PaymentsError::IntentNotFound(_)
            | PaymentsError::WebhookNotFound(_)
            | PaymentsError::WalletNotFound(_) => StatusCode::NOT_FOUND,
            PaymentsError::InvalidStatusForSettlement { .. }
            | PaymentsError::IllegalTransition { .. }
            | PaymentsError::PaymentNotSettled(_) => StatusCode::CONFLICT,
            PaymentsError::RefundExceedsRemaining { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PaymentsError::SettlementTimeout => StatusCode::GATEWAY_TIMEOUT,
            PaymentsError::Ledger(err) => match err {
                ledger_core::Error::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                ledger_core::Error::DebitOnNonExistentWallet(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                ledger_core::Error::SerializationFailure => StatusCode::SERVICE_UNAVAILABLE,
                ledger_core::Error::InvalidReference(_)
                | ledger_core::Error::InvalidAmount(_) => StatusCode::BAD_REQUEST,
                ledger_core::Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            PaymentsError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}
