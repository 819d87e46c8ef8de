//! HTTP surface (v1)
//!
//! Thin adapters over the services; all domain decisions live below.

use crate::errors::PaymentsError;
use crate::models::{
    CreatePaymentIntentRequest, CreateRefundRequest, LedgerEntryQuery, ReplayWebhookRequest,
    VerifyChainRequest,
};
use crate::services::{IntentService, RefundService, SettlementService, WebhookService};
use actix_web::{web, HttpRequest, HttpResponse};
use ledger_core::store::EntryFilter;
use ledger_core::{EntryType, LedgerStore};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "payments-engine",
    }))
}

/// Create a payment intent. 201 for a new record, 200 for the idempotent
/// replay of an existing order.
pub async fn create_payment_intent(
    intents: web::Data<Arc<IntentService>>,
    request: web::Json<CreatePaymentIntentRequest>,
) -> Result<HttpResponse, PaymentsError> {
    let (intent, created) = intents.create(request.into_inner()).await?;
    if created {
        Ok(HttpResponse::Created().json(intent))
    } else {
        Ok(HttpResponse::Ok().json(intent))
    }
}

pub async fn get_payment_intent(
    intents: web::Data<Arc<IntentService>>,
    id: web::Path<Uuid>,
) -> Result<HttpResponse, PaymentsError> {
    let intent = intents.get(*id).await?;
    Ok(HttpResponse::Ok().json(intent))
}

pub async fn create_refund_intent(
    refunds: web::Data<Arc<RefundService>>,
    request: web::Json<CreateRefundRequest>,
) -> Result<HttpResponse, PaymentsError> {
    let refund = refunds.create(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(refund))
}

/// Provider webhook ingress. Duplicates and failed verifications still
/// answer 200 so providers do not retry what the inbox already holds.
pub async fn ingest_webhook(
    webhooks: web::Data<Arc<WebhookService>>,
    provider: web::Path<String>,
    body: web::Bytes,
    request: HttpRequest,
) -> Result<HttpResponse, PaymentsError> {
    let outcome = webhooks
        .ingest(&provider, &body, request.headers())
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

pub async fn list_ledger_entries(
    ledger: web::Data<Arc<LedgerStore>>,
    query: web::Query<LedgerEntryQuery>,
) -> Result<HttpResponse, PaymentsError> {
    let query = query.into_inner();
    let entry_type = match query.entry_type.as_deref() {
        Some(raw) => Some(
            raw.parse::<EntryType>()
                .map_err(PaymentsError::Validation)?,
        ),
        None => None,
    };

    let page = ledger
        .list_entries(EntryFilter {
            account_id: query.account_id,
            reference: query.reference,
            order_id: query.order_id,
            entry_type,
            from_date: query.from_date,
            to_date: query.to_date,
            page: query.page.unwrap_or(1),
            limit: query.limit.unwrap_or(50),
        })
        .await
        .map_err(PaymentsError::Ledger)?;

    Ok(HttpResponse::Ok().json(json!({
        "entries": page.entries,
        "total": page.total,
        "page": page.page,
        "limit": page.limit,
    })))
}

pub async fn get_wallet_balance(
    ledger: web::Data<Arc<LedgerStore>>,
    account_id: web::Path<String>,
) -> Result<HttpResponse, PaymentsError> {
    let balance = ledger
        .balance(&account_id)
        .await
        .map_err(PaymentsError::Ledger)?
        .ok_or_else(|| PaymentsError::WalletNotFound(account_id.to_string()))?;
    Ok(HttpResponse::Ok().json(balance))
}

pub async fn verify_chain(
    ledger: web::Data<Arc<LedgerStore>>,
    request: web::Json<VerifyChainRequest>,
) -> Result<HttpResponse, PaymentsError> {
    let request = request.into_inner();
    let result = ledger
        .verify_chain(&request.account_id, request.from_seq, request.to_seq)
        .await
        .map_err(PaymentsError::Ledger)?;
    Ok(HttpResponse::Ok().json(result))
}

pub async fn replay_webhook(
    webhooks: web::Data<Arc<WebhookService>>,
    request: web::Json<ReplayWebhookRequest>,
) -> Result<HttpResponse, PaymentsError> {
    let request = request.into_inner();
    let outcome = webhooks.replay(request.webhook_id, &request.reason).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// Settlement replay for operators; the orchestrator makes this idempotent.
pub async fn settle_payment(
    settlement: web::Data<Arc<SettlementService>>,
    id: web::Path<Uuid>,
) -> Result<HttpResponse, PaymentsError> {
    let outcome = settlement.settle_payment(*id).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check)).service(
        web::scope("/v1")
            .route("/intents/payments", web::post().to(create_payment_intent))
            .route("/intents/payments/{id}", web::get().to(get_payment_intent))
            .route("/intents/refunds", web::post().to(create_refund_intent))
            .route("/webhooks/{provider}", web::post().to(ingest_webhook))
            .route("/ledger/entries", web::get().to(list_ledger_entries))
            .route("/ledger/verify-chain", web::post().to(verify_chain))
            .route("/wallets/{account_id}/balance", web::get().to(get_wallet_balance))
            .route("/ops/replay-webhook", web::post().to(replay_webhook))
            .route("/ops/settle/{id}", web::post().to(settle_payment)),
    );
}
