//! Payment intent lifecycle
//!
//! Creation enforces the amount/discount invariants; the derived reference
//! `PAYMENT_{orderId}` makes creation idempotent (first writer wins the full
//! record). Status moves forward only; `SETTLED` is reserved to the
//! settlement orchestrator.

use crate::database::{is_unique_violation, Database};
use crate::errors::{PaymentsError, Result};
use crate::models::{CreatePaymentIntentRequest, PaymentIntent, PaymentIntentStatus};
use ledger_core::references;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct IntentService {
    db: Arc<Database>,
}

/// Check the creation invariants and return the derived discount amount.
pub fn validate_create(request: &CreatePaymentIntentRequest) -> Result<Decimal> {
    if request.amount <= Decimal::ZERO || request.amount.scale() > 4 {
        return Err(PaymentsError::InvalidAmount(request.amount));
    }
    if request.original_amount.scale() > 4 {
        return Err(PaymentsError::InvalidAmount(request.original_amount));
    }
    if request.original_amount < request.amount {
        return Err(PaymentsError::InvalidAmounts {
            amount: request.amount,
            original: request.original_amount,
        });
    }
    let discount = request.original_amount - request.amount;
    if discount < Decimal::ZERO {
        return Err(PaymentsError::InvalidDiscount(discount));
    }
    if discount > Decimal::ZERO
        && request
            .discount_code
            .as_deref()
            .map_or(true, |code| code.trim().is_empty())
    {
        return Err(PaymentsError::DiscountCodeRequired);
    }
    Ok(discount)
}

impl IntentService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a payment intent, or return the existing one for the same
    /// order unchanged. The boolean reports whether a new record was written.
    pub async fn create(
        &self,
        request: CreatePaymentIntentRequest,
    ) -> Result<(PaymentIntent, bool)> {
        validator::Validate::validate(&request)
            .map_err(|e| PaymentsError::Validation(e.to_string()))?;
        let discount_amount = validate_create(&request)?;

        let reference = references::payment_reference(&request.order_id);
        if let Some(existing) = self.db.payment_intent_by_reference(&reference).await? {
            return Ok((existing, false));
        }

        let mut amount = request.amount;
        amount.rescale(4);
        let mut original_amount = request.original_amount;
        original_amount.rescale(4);
        let mut discount_amount = discount_amount;
        discount_amount.rescale(4);

        let currency = request.currency.as_deref().unwrap_or("NGN");
        let inserted = self
            .db
            .insert_payment_intent(
                &reference,
                &request.order_id,
                amount,
                original_amount,
                discount_amount,
                request.discount_code.as_deref(),
                &request.provider,
                currency,
                request.metadata,
            )
            .await;

        match inserted {
            Ok(intent) => {
                info!(
                    reference = %intent.reference,
                    order_id = %intent.order_id,
                    amount = %intent.amount,
                    discount = %intent.discount_amount,
                    "payment intent created"
                );
                Ok((intent, true))
            }
            // Concurrent creator won the unique reference; return its record.
            Err(err) if is_unique_violation(&err) => {
                let existing = self
                    .db
                    .payment_intent_by_reference(&reference)
                    .await?
                    .ok_or_else(|| PaymentsError::IntentNotFound(reference.clone()))?;
                Ok((existing, false))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<PaymentIntent> {
        self.db
            .payment_intent(id)
            .await?
            .ok_or_else(|| PaymentsError::IntentNotFound(id.to_string()))
    }

    pub async fn get_by_reference(&self, reference: &str) -> Result<PaymentIntent> {
        self.db
            .payment_intent_by_reference(reference)
            .await?
            .ok_or_else(|| PaymentsError::IntentNotFound(reference.to_string()))
    }

    pub async fn get_by_order_id(&self, order_id: &str) -> Result<PaymentIntent> {
        self.get_by_reference(&references::payment_reference(order_id))
            .await
    }

    /// Move an intent forward through the state machine. Rejects backward
    /// moves, terminal targets owned by other components, and lost races.
    pub async fn advance_status(
        &self,
        id: Uuid,
        target: PaymentIntentStatus,
    ) -> Result<PaymentIntent> {
        let intent = self.get(id).await?;
        let current = intent
            .status()
            .ok_or_else(|| PaymentsError::Validation(format!("corrupt status: {}", intent.status)))?;

        if current == target {
            return Ok(intent);
        }
        if !current.can_advance_to(target) {
            return Err(PaymentsError::IllegalTransition {
                from: current.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }

        self.db
            .update_intent_status(id, current, target)
            .await?
            .ok_or(PaymentsError::IllegalTransition {
                from: current.as_str().to_string(),
                to: target.as_str().to_string(),
            })
    }
}
