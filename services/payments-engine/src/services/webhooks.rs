//! Webhook ingress pipeline
//!
//! Dedup on `(provider, providerEventId)` backed by the inbox unique index,
//! provider signature verification, then idempotent settlement triggering.
//! Failed verifications are kept in the inbox for audit; verified webhooks
//! whose settlement fails stay `VERIFIED` and are replayable.

use crate::audit;
use crate::database::{is_unique_violation, Database};
use crate::errors::{PaymentsError, Result};
use crate::models::{PaymentIntentStatus, WebhookInboxEntry, WebhookOutcome, WebhookStatus};
use crate::providers::{self, SignatureVerifier};
use crate::services::intents::IntentService;
use crate::services::settlement::SettlementService;
use actix_web::http::header::HeaderMap;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct WebhookService {
    db: Arc<Database>,
    intents: Arc<IntentService>,
    settlement: Arc<SettlementService>,
    verifier: SignatureVerifier,
}

impl WebhookService {
    pub fn new(
        db: Arc<Database>,
        intents: Arc<IntentService>,
        settlement: Arc<SettlementService>,
        verifier: SignatureVerifier,
    ) -> Self {
        Self {
            db,
            intents,
            settlement,
            verifier,
        }
    }

    /// Ingest one provider webhook.
    pub async fn ingest(
        &self,
        provider: &str,
        raw_body: &[u8],
        headers: &HeaderMap,
    ) -> Result<WebhookOutcome> {
        if !SignatureVerifier::known_provider(provider) {
            return Err(PaymentsError::UnknownProvider(provider.to_string()));
        }

        let payload: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| PaymentsError::Validation(format!("invalid webhook payload: {e}")))?;
        let provider_event_id = providers::extract_event_id(&payload);
        let reference = providers::extract_reference(&payload);

        if let Some(existing) = self
            .db
            .webhook_by_provider_event(provider, &provider_event_id)
            .await?
        {
            return self.mark_duplicate(existing).await;
        }

        let headers_json = headers_to_json(headers);
        let entry = match self
            .db
            .insert_webhook(
                provider,
                &provider_event_id,
                reference.as_deref(),
                payload,
                headers_json,
            )
            .await
        {
            Ok(entry) => entry,
            // Lost the insert race on the unique index: the other delivery is
            // the original, this one is the duplicate.
            Err(err) if is_unique_violation(&err) => {
                let existing = self
                    .db
                    .webhook_by_provider_event(provider, &provider_event_id)
                    .await?
                    .ok_or(PaymentsError::Database(err))?;
                return self.mark_duplicate(existing).await;
            }
            Err(err) => return Err(err.into()),
        };

        if !self.verifier.verify(provider, raw_body, headers) {
            warn!(
                webhook_id = %entry.id,
                provider,
                "webhook signature verification failed"
            );
            self.db
                .update_webhook_status(
                    entry.id,
                    WebhookStatus::Failed,
                    Some("SIGNATURE_INVALID: signature header missing or mismatched"),
                    true,
                )
                .await?;
            return Ok(WebhookOutcome {
                webhook_id: entry.id,
                processed: false,
                is_duplicate: None,
                status: WebhookStatus::Failed,
            });
        }

        self.db
            .update_webhook_status(entry.id, WebhookStatus::Verified, None, true)
            .await?;

        let Some(reference) = reference else {
            info!(
                webhook_id = %entry.id,
                provider,
                "verified webhook carries no reference, stopping"
            );
            return Ok(WebhookOutcome {
                webhook_id: entry.id,
                processed: false,
                is_duplicate: None,
                status: WebhookStatus::Verified,
            });
        };

        if let Err(err) = self.trigger_settlement(&reference).await {
            // The entry stays VERIFIED and replayable; the provider retries.
            self.db
                .update_webhook_status(
                    entry.id,
                    WebhookStatus::Verified,
                    Some(&err.to_string()),
                    false,
                )
                .await?;
            return Err(err);
        }
        self.db
            .update_webhook_status(entry.id, WebhookStatus::Processed, None, true)
            .await?;

        Ok(WebhookOutcome {
            webhook_id: entry.id,
            processed: true,
            is_duplicate: None,
            status: WebhookStatus::Processed,
        })
    }

    /// Ops replay of a stored webhook. Already-processed webhooks are a
    /// no-op.
    pub async fn replay(&self, webhook_id: Uuid, reason: &str) -> Result<WebhookOutcome> {
        let entry = self
            .db
            .webhook(webhook_id)
            .await?
            .ok_or(PaymentsError::WebhookNotFound(webhook_id))?;

        if entry.status == WebhookStatus::Processed.as_str() {
            return Ok(WebhookOutcome {
                webhook_id: entry.id,
                processed: true,
                is_duplicate: None,
                status: WebhookStatus::Processed,
            });
        }

        let reference = entry.reference.clone().ok_or_else(|| {
            PaymentsError::Validation("stored webhook carries no reference".to_string())
        })?;

        self.trigger_settlement(&reference).await?;
        self.db
            .update_webhook_status(entry.id, WebhookStatus::Processed, None, true)
            .await?;

        audit::record(
            "WEBHOOK_REPLAYED",
            "ops",
            "success",
            json!({
                "webhookId": entry.id,
                "reference": reference,
                "reason": reason,
            }),
        );

        Ok(WebhookOutcome {
            webhook_id: entry.id,
            processed: true,
            is_duplicate: None,
            status: WebhookStatus::Processed,
        })
    }

    async fn mark_duplicate(&self, existing: WebhookInboxEntry) -> Result<WebhookOutcome> {
        if existing.status != WebhookStatus::Duplicate.as_str() {
            self.db
                .update_webhook_status(existing.id, WebhookStatus::Duplicate, None, false)
                .await?;
        }
        info!(
            webhook_id = %existing.id,
            provider = %existing.provider,
            provider_event_id = %existing.provider_event_id,
            "duplicate webhook delivery"
        );
        Ok(WebhookOutcome {
            webhook_id: existing.id,
            processed: false,
            is_duplicate: Some(true),
            status: WebhookStatus::Duplicate,
        })
    }

    /// Advance the intent into `CONFIRMING` if the provider confirmation
    /// arrived before any earlier transition, then settle. Settlement itself
    /// is idempotent, so re-deliveries after success are harmless.
    async fn trigger_settlement(&self, reference: &str) -> Result<()> {
        let intent = self.intents.get_by_reference(reference).await?;
        match intent.status() {
            Some(PaymentIntentStatus::Pending) | Some(PaymentIntentStatus::Initiated) => {
                self.intents
                    .advance_status(intent.id, PaymentIntentStatus::Confirming)
                    .await?;
            }
            _ => {}
        }
        self.settlement.settle_payment(intent.id).await?;
        Ok(())
    }
}

fn headers_to_json(headers: &HeaderMap) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                serde_json::Value::String(value.to_str().unwrap_or("").to_string()),
            )
        })
        .collect();
    serde_json::Value::Object(map)
}
