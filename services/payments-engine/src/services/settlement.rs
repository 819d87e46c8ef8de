//! Settlement orchestration
//!
//! The only component that writes to the ledger. A confirmed payment intent
//! becomes one entry (no discount) or three (primary escrow credit, marketing
//! wallet debit, escrow subsidy credit), all inside one serializable
//! transaction with a hard time budget; any failure rolls the whole
//! settlement back and leaves the intent in `CONFIRMING`.

use crate::audit;
use crate::database::Database;
use crate::errors::{PaymentsError, Result};
use crate::models::{PaymentIntent, PaymentIntentStatus};
use chrono::Utc;
use ledger_core::{
    append_entry, references, AppendEntry, EntryType, LedgerEntry, LedgerStore, MARKETING_WALLET,
    PLATFORM_ESCROW,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a settlement call, idempotent across retries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementOutcome {
    pub intent_id: Uuid,
    pub reference: String,
    pub already_settled: bool,
    pub entries: Vec<LedgerEntry>,
    pub message: String,
}

pub struct SettlementService {
    db: Arc<Database>,
    ledger: Arc<LedgerStore>,
    timeout: Duration,
}

impl SettlementService {
    pub fn new(db: Arc<Database>, ledger: Arc<LedgerStore>, timeout: Duration) -> Self {
        Self {
            db,
            ledger,
            timeout,
        }
    }

    /// Settle by reference: resolve the intent, then delegate.
    pub async fn settle_payment_by_reference(&self, reference: &str) -> Result<SettlementOutcome> {
        let intent = self
            .db
            .payment_intent_by_reference(reference)
            .await?
            .ok_or_else(|| PaymentsError::IntentNotFound(reference.to_string()))?;
        self.settle_payment(intent.id).await
    }

    /// Settle a confirmed payment intent. Safe to re-invoke: after the first
    /// success every call returns the same entries without writing.
    pub async fn settle_payment(&self, intent_id: Uuid) -> Result<SettlementOutcome> {
        let outcome = tokio::time::timeout(self.timeout, self.settle_in_transaction(intent_id))
            .await
            .map_err(|_| {
                warn!(%intent_id, "settlement transaction exceeded its time budget");
                PaymentsError::SettlementTimeout
            })??;

        if !outcome.already_settled {
            audit::record(
                "PAYMENT_SETTLED",
                "settlement-service",
                "success",
                json!({
                    "intentId": outcome.intent_id,
                    "reference": outcome.reference,
                    "entries": outcome.entries.len(),
                }),
            );
        }

        Ok(outcome)
    }

    async fn settle_in_transaction(&self, intent_id: Uuid) -> Result<SettlementOutcome> {
        let mut tx = self.ledger.pool().begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let intent = sqlx::query_as::<_, PaymentIntent>(
            "SELECT * FROM payment_intents WHERE id = $1 FOR UPDATE",
        )
        .bind(intent_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| PaymentsError::IntentNotFound(intent_id.to_string()))?;

        let status = intent.status().ok_or_else(|| {
            PaymentsError::Validation(format!("corrupt intent status: {}", intent.status))
        })?;

        if status == PaymentIntentStatus::Settled {
            let entries = self.settled_entries(&intent).await?;
            return Ok(SettlementOutcome {
                intent_id: intent.id,
                reference: intent.reference,
                already_settled: true,
                entries,
                message: "Payment already settled".to_string(),
            });
        }
        if status != PaymentIntentStatus::Confirming {
            return Err(PaymentsError::InvalidStatusForSettlement {
                current: status.as_str().to_string(),
                required: "CONFIRMING",
            });
        }

        let mut entries = Vec::with_capacity(3);

        entries.push(
            append_entry(
                &mut tx,
                AppendEntry {
                    account_id: PLATFORM_ESCROW.to_string(),
                    reference: intent.reference.clone(),
                    order_id: Some(intent.order_id.clone()),
                    entry_type: EntryType::Credit,
                    amount: intent.amount,
                    description: Some(format!("Payment received for order {}", intent.order_id)),
                },
            )
            .await?,
        );

        if intent.discount_amount > Decimal::ZERO {
            let discount_code = intent.discount_code.as_deref().unwrap_or("");
            entries.push(
                append_entry(
                    &mut tx,
                    AppendEntry {
                        account_id: MARKETING_WALLET.to_string(),
                        reference: references::discount_reference(&intent.reference),
                        order_id: Some(intent.order_id.clone()),
                        entry_type: EntryType::Debit,
                        amount: intent.discount_amount,
                        description: Some(format!(
                            "Discount subsidy for order {} ({})",
                            intent.order_id, discount_code
                        )),
                    },
                )
                .await?,
            );
            entries.push(
                append_entry(
                    &mut tx,
                    AppendEntry {
                        account_id: PLATFORM_ESCROW.to_string(),
                        reference: references::discount_escrow_reference(&intent.reference),
                        order_id: Some(intent.order_id.clone()),
                        entry_type: EntryType::Credit,
                        amount: intent.discount_amount,
                        description: Some(format!(
                            "Discount subsidy credit for order {}",
                            intent.order_id
                        )),
                    },
                )
                .await?,
            );
        }

        sqlx::query("UPDATE payment_intents SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(PaymentIntentStatus::Settled.as_str())
            .bind(Utc::now())
            .bind(intent.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await.map_err(map_commit_error)?;

        info!(
            intent_id = %intent.id,
            reference = %intent.reference,
            entries = entries.len(),
            "payment settled"
        );

        Ok(SettlementOutcome {
            intent_id: intent.id,
            reference: intent.reference,
            already_settled: false,
            entries,
            message: "Payment settled".to_string(),
        })
    }

    /// The up-to-three legs of a settled payment.
    async fn settled_entries(&self, intent: &PaymentIntent) -> Result<Vec<LedgerEntry>> {
        let refs = vec![
            intent.reference.clone(),
            references::discount_reference(&intent.reference),
            references::discount_escrow_reference(&intent.reference),
        ];
        Ok(self.ledger.entries_by_references(&refs).await?)
    }
}

fn map_commit_error(err: sqlx::Error) -> PaymentsError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("40001") {
            return PaymentsError::Ledger(ledger_core::Error::SerializationFailure);
        }
    }
    PaymentsError::Ledger(ledger_core::Error::Database(err))
}
