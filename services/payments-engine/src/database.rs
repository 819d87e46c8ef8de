//! Intent, refund, and webhook inbox persistence
//!
//! Ledger tables are owned by `ledger-core`; this layer only touches the
//! intent and inbox tables. Status transitions go through compare-and-set
//! updates so concurrent operators cannot move an intent backwards.

use crate::errors::Result;
use crate::models::{
    PaymentIntent, PaymentIntentStatus, RefundIntent, RefundIntentStatus, WebhookInboxEntry,
    WebhookStatus,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use uuid::Uuid;

/// Postgres unique_violation; callers resolve these as idempotency races.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Database { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Database { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ----- payment intents -----

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_payment_intent(
        &self,
        reference: &str,
        order_id: &str,
        amount: Decimal,
        original_amount: Decimal,
        discount_amount: Decimal,
        discount_code: Option<&str>,
        provider: &str,
        currency: &str,
        metadata: Option<serde_json::Value>,
    ) -> std::result::Result<PaymentIntent, sqlx::Error> {
        sqlx::query_as::<_, PaymentIntent>(
            r#"
            INSERT INTO payment_intents (
                id, reference, order_id, amount, original_amount, discount_amount,
                discount_code, provider, currency, metadata, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(reference)
        .bind(order_id)
        .bind(amount)
        .bind(original_amount)
        .bind(discount_amount)
        .bind(discount_code)
        .bind(provider)
        .bind(currency)
        .bind(metadata)
        .bind(PaymentIntentStatus::Pending.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
    }

    pub async fn payment_intent(&self, id: Uuid) -> Result<Option<PaymentIntent>> {
        let intent =
            sqlx::query_as::<_, PaymentIntent>("SELECT * FROM payment_intents WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(intent)
    }

    pub async fn payment_intent_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentIntent>> {
        let intent = sqlx::query_as::<_, PaymentIntent>(
            "SELECT * FROM payment_intents WHERE reference = $1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        Ok(intent)
    }

    /// Compare-and-set status update; returns the updated row only when the
    /// expected current status still held.
    pub async fn update_intent_status(
        &self,
        id: Uuid,
        from: PaymentIntentStatus,
        to: PaymentIntentStatus,
    ) -> Result<Option<PaymentIntent>> {
        let intent = sqlx::query_as::<_, PaymentIntent>(
            r#"
            UPDATE payment_intents
            SET status = $1, updated_at = $2
            WHERE id = $3 AND status = $4
            RETURNING *
            "#,
        )
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(from.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(intent)
    }

    // ----- refund intents -----

    pub async fn insert_refund_intent(
        &self,
        reference: &str,
        payment_intent_id: Uuid,
        amount: Decimal,
        reason: &str,
        description: Option<&str>,
    ) -> std::result::Result<RefundIntent, sqlx::Error> {
        sqlx::query_as::<_, RefundIntent>(
            r#"
            INSERT INTO refund_intents (
                id, reference, payment_intent_id, amount, reason, description, status,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(reference)
        .bind(payment_intent_id)
        .bind(amount)
        .bind(reason)
        .bind(description)
        .bind(RefundIntentStatus::Pending.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
    }

    /// Count of refund intents on a payment that have not terminally failed.
    pub async fn refund_count_non_failed(&self, payment_intent_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM refund_intents WHERE payment_intent_id = $1 AND status <> $2",
        )
        .bind(payment_intent_id)
        .bind(RefundIntentStatus::Failed.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Sum of refund amounts on a payment that have not terminally failed.
    pub async fn refund_total_non_failed(&self, payment_intent_id: Uuid) -> Result<Decimal> {
        let total: Option<Decimal> = sqlx::query_scalar(
            "SELECT SUM(amount) FROM refund_intents WHERE payment_intent_id = $1 AND status <> $2",
        )
        .bind(payment_intent_id)
        .bind(RefundIntentStatus::Failed.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(total.unwrap_or(Decimal::ZERO))
    }

    // ----- webhook inbox -----

    pub async fn webhook(&self, id: Uuid) -> Result<Option<WebhookInboxEntry>> {
        let entry =
            sqlx::query_as::<_, WebhookInboxEntry>("SELECT * FROM webhook_inbox WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(entry)
    }

    pub async fn webhook_by_provider_event(
        &self,
        provider: &str,
        provider_event_id: &str,
    ) -> Result<Option<WebhookInboxEntry>> {
        let entry = sqlx::query_as::<_, WebhookInboxEntry>(
            "SELECT * FROM webhook_inbox WHERE provider = $1 AND provider_event_id = $2",
        )
        .bind(provider)
        .bind(provider_event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    pub async fn insert_webhook(
        &self,
        provider: &str,
        provider_event_id: &str,
        reference: Option<&str>,
        payload: serde_json::Value,
        headers: serde_json::Value,
    ) -> std::result::Result<WebhookInboxEntry, sqlx::Error> {
        sqlx::query_as::<_, WebhookInboxEntry>(
            r#"
            INSERT INTO webhook_inbox (
                id, provider, provider_event_id, reference, payload, headers, status,
                received_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(provider)
        .bind(provider_event_id)
        .bind(reference)
        .bind(payload)
        .bind(headers)
        .bind(WebhookStatus::Received.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update_webhook_status(
        &self,
        id: Uuid,
        status: WebhookStatus,
        error_message: Option<&str>,
        mark_processed_at: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_inbox
            SET status = $1,
                error_message = COALESCE($2, error_message),
                processed_at = CASE WHEN $3 THEN $4 ELSE processed_at END
            WHERE id = $5
            "#,
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(mark_processed_at)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
