//! Refund intent creation
//!
//! Refunds are only declared here; no ledger entries are emitted until the
//! disbursement path exists. The running total of non-failed refunds on a
//! payment can never exceed the amount actually charged.

use crate::database::{is_unique_violation, Database};
use crate::errors::{PaymentsError, Result};
use crate::models::{CreateRefundRequest, PaymentIntentStatus, RefundIntent};
use ledger_core::references;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// Reference minting re-reads the sequence on conflict; three attempts cover
/// any realistic burst of concurrent refund requests on one payment.
const MINT_ATTEMPTS: usize = 3;

pub struct RefundService {
    db: Arc<Database>,
}

impl RefundService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn create(&self, request: CreateRefundRequest) -> Result<RefundIntent> {
        validator::Validate::validate(&request)
            .map_err(|e| PaymentsError::Validation(e.to_string()))?;
        if request.amount <= Decimal::ZERO || request.amount.scale() > 4 {
            return Err(PaymentsError::InvalidAmount(request.amount));
        }

        let intent = self
            .db
            .payment_intent(request.payment_intent_id)
            .await?
            .ok_or_else(|| {
                PaymentsError::IntentNotFound(request.payment_intent_id.to_string())
            })?;
        if intent.status() != Some(PaymentIntentStatus::Settled) {
            return Err(PaymentsError::PaymentNotSettled(intent.id));
        }

        let mut amount = request.amount;
        amount.rescale(4);

        let refunded = self.db.refund_total_non_failed(intent.id).await?;
        let remaining = intent.amount - refunded;
        if amount > remaining {
            return Err(PaymentsError::RefundExceedsRemaining {
                requested: amount,
                remaining,
            });
        }

        let intent_key = intent.id.simple().to_string().to_uppercase();
        let mut last_err = None;
        for _ in 0..MINT_ATTEMPTS {
            let sequence = self.db.refund_count_non_failed(intent.id).await? as u32 + 1;
            let reference = references::refund_reference(&intent_key, sequence);

            match self
                .db
                .insert_refund_intent(
                    &reference,
                    intent.id,
                    amount,
                    &request.reason,
                    request.description.as_deref(),
                )
                .await
            {
                Ok(refund) => {
                    info!(
                        reference = %refund.reference,
                        payment_intent_id = %intent.id,
                        amount = %refund.amount,
                        "refund intent created"
                    );
                    return Ok(refund);
                }
                Err(err) if is_unique_violation(&err) => {
                    last_err = Some(err);
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(last_err
            .map(PaymentsError::from)
            .unwrap_or_else(|| PaymentsError::Validation("refund reference minting failed".into())))
    }
}
